use serde::{Deserialize, Serialize};

use crate::money::Currency;

/// Per-group settings that shape how debts are settled.
///
/// Deserialises from the group's settings object; unknown keys are ignored
/// and missing ones take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupSettings {
    /// Net debts across the whole group instead of pair by pair.
    pub simplify_debts: bool,
    pub currency: Currency,
}

impl Default for GroupSettings {
    fn default() -> Self {
        GroupSettings {
            simplify_debts: true,
            currency: Currency::Usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let settings: GroupSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, GroupSettings::default());
        assert!(settings.simplify_debts);
    }

    #[test]
    fn reads_group_settings_json() {
        let settings: GroupSettings = serde_json::from_str(
            r#"{"simplifyDebts": false, "currency": "GBP", "allowMemberToInvite": true}"#,
        )
        .unwrap();
        assert_eq!(
            settings,
            GroupSettings {
                simplify_debts: false,
                currency: Currency::Gbp,
            }
        );
    }

    #[test]
    fn unknown_currency_is_an_error() {
        assert!(serde_json::from_str::<GroupSettings>(r#"{"currency": "XYZ"}"#).is_err());
    }
}
