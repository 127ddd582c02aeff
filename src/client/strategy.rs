//! Built-in activation strategies and variant selection.
//!
//! Only the strategies an edge proxy commonly needs are understood:
//! `default`, `userWithId`, `remoteAddress`, `flexibleRollout`, and
//! `gradualRolloutUserId`. Anything else evaluates to off. Bucketing
//! hashes with SHA-256 so results are stable across restarts and
//! instances.

use sha2::{Digest, Sha256};

use super::model::{Context, EvaluatedToggle, FeatureToggle, Strategy, Variant};

/// Stable bucket in `1..=modulus` for `key`. `modulus` must be non-zero.
fn bucket(key: &str, modulus: u64) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % modulus + 1
}

fn list_contains(list: Option<String>, needle: &str) -> bool {
    list.is_some_and(|l| l.split(',').map(str::trim).any(|v| v == needle))
}

fn percentage(strategy: &Strategy, key: &str) -> u64 {
    strategy
        .param(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
        .min(100)
}

fn strategy_enabled(strategy: &Strategy, toggle: &FeatureToggle, context: &Context) -> bool {
    match strategy.name.as_str() {
        "default" => true,
        "userWithId" => context
            .user_id
            .as_deref()
            .is_some_and(|id| list_contains(strategy.param("userIds"), id)),
        "remoteAddress" => context
            .remote_address
            .as_deref()
            .is_some_and(|addr| list_contains(strategy.param("IPs"), addr)),
        "flexibleRollout" => {
            let rollout = percentage(strategy, "rollout");
            let stickiness = strategy.param("stickiness").unwrap_or_else(|| "default".into());
            let group = strategy.param("groupId").unwrap_or_else(|| toggle.name.clone());
            match context.stickiness_value(&stickiness) {
                Some(value) => bucket(&format!("{group}:{value}"), 100) <= rollout,
                // No sticky identity to bucket on: only a full rollout applies
                None => rollout >= 100,
            }
        }
        "gradualRolloutUserId" => {
            let rollout = percentage(strategy, "percentage");
            let group = strategy.param("groupId").unwrap_or_else(|| toggle.name.clone());
            context
                .user_id
                .as_deref()
                .is_some_and(|id| bucket(&format!("{group}:{id}"), 100) <= rollout)
        }
        _ => false,
    }
}

#[must_use]
pub fn is_enabled(toggle: &FeatureToggle, context: &Context) -> bool {
    toggle.enabled
        && (toggle.strategies.is_empty()
            || toggle
                .strategies
                .iter()
                .any(|s| strategy_enabled(s, toggle, context)))
}

#[must_use]
pub fn select_variant(toggle: &FeatureToggle, context: &Context) -> Variant {
    // Summed as u64, u32 weights overflow u32
    let total: u64 = toggle.variants.iter().map(|v| u64::from(v.weight)).sum();
    if total == 0 {
        return Variant::disabled();
    }

    let stickiness = toggle
        .variants
        .iter()
        .find_map(|v| v.stickiness.as_deref())
        .unwrap_or("default");
    let key = context
        .stickiness_value(stickiness)
        .or(context.remote_address.as_deref())
        .unwrap_or(&toggle.name);

    let target = bucket(&format!("{}:{key}", toggle.name), total);
    let mut acc = 0_u64;
    for definition in &toggle.variants {
        acc += u64::from(definition.weight);
        if target <= acc {
            return Variant {
                name: definition.name.clone(),
                enabled: true,
                payload: definition.payload.clone(),
            };
        }
    }
    Variant::disabled()
}

#[must_use]
pub fn evaluate(toggle: &FeatureToggle, context: &Context) -> EvaluatedToggle {
    let enabled = is_enabled(toggle, context);
    EvaluatedToggle {
        name: toggle.name.clone(),
        enabled,
        variant: if enabled {
            select_variant(toggle, context)
        } else {
            Variant::disabled()
        },
        impression_data: toggle.impression_data,
    }
}
