use common::{impl_display_for_enum, impl_from_str_for_enum, models::User};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeKind {
    Multitap,
    EnergyLimit,
}

impl_from_str_for_enum!(UpgradeKind, Multitap => "multitap", EnergyLimit => "energyLimit");
impl_display_for_enum!(UpgradeKind, Multitap => "multitap", EnergyLimit => "energyLimit");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub level: i32,
    pub cost: i64,
    /// Taps per touch for multitap, energy cap for the energy ladder.
    pub value: i64,
}

const fn tier(level: i32, cost: i64, value: i64) -> Tier {
    Tier { level, cost, value }
}

const MULTITAP: [Tier; 5] = [
    tier(1, 0, 1),
    tier(2, 500, 2),
    tier(3, 2_500, 3),
    tier(4, 10_000, 4),
    tier(5, 50_000, 5),
];

const ENERGY_LIMIT: [Tier; 5] = [
    tier(1, 0, 1_000),
    tier(2, 1_000, 2_000),
    tier(3, 5_000, 3_000),
    tier(4, 15_000, 4_000),
    tier(5, 40_000, 5_000),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeError {
    #[error("Max level reached")]
    MaxLevel,

    #[error("Not enough coins")]
    NotEnoughCoins,
}

impl UpgradeKind {
    pub fn ladder(self) -> &'static [Tier] {
        match self {
            UpgradeKind::Multitap => &MULTITAP,
            UpgradeKind::EnergyLimit => &ENERGY_LIMIT,
        }
    }

    /// JSON field the purchase response reports the new level under.
    pub fn level_field(self) -> &'static str {
        match self {
            UpgradeKind::Multitap => "multitapLevel",
            UpgradeKind::EnergyLimit => "energyLimitLevel",
        }
    }

    pub fn level_of(self, user: &User) -> i32 {
        let level = match self {
            UpgradeKind::Multitap => user.multitap_level,
            UpgradeKind::EnergyLimit => user.energy_limit_level,
        };
        level.max(1)
    }

    fn set_level(self, user: &mut User, level: i32) {
        match self {
            UpgradeKind::Multitap => user.multitap_level = level,
            UpgradeKind::EnergyLimit => user.energy_limit_level = level,
        }
    }
}

/// Debits the next tier's cost and bumps the level. On `Err` nothing changes.
pub fn purchase_upgrade(user: &mut User, kind: UpgradeKind) -> Result<Tier, UpgradeError> {
    let current = kind.level_of(user);
    let next = kind
        .ladder()
        .iter()
        .find(|t| t.level == current + 1)
        .copied()
        .ok_or(UpgradeError::MaxLevel)?;

    if user.coins < next.cost {
        return Err(UpgradeError::NotEnoughCoins);
    }

    user.coins -= next.cost;
    kind.set_level(user, next.level);
    Ok(next)
}
