//! Pro feature gating decisions.

use serde::{Deserialize, Serialize};

/// How a Pro feature appears to users without access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureVisibility {
    #[default]
    Locked,
    Hidden,
}

/// Configuration of one Pro feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProFeatureConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub default_visibility: FeatureVisibility,
    #[serde(default)]
    pub visibility_override: Option<FeatureVisibility>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProFeatureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_visibility: FeatureVisibility::Locked,
            visibility_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProFeatureStatus {
    Enabled,
    Disabled,
    Locked,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProFeatureReason {
    InternalBypass,
    ConfigDisabled,
    ProMember,
    OverrideLocked,
    OverrideHidden,
    DefaultLocked,
    DefaultHidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProFeatureDecision {
    pub status: ProFeatureStatus,
    pub reason: ProFeatureReason,
}

impl ProFeatureDecision {
    fn new(status: ProFeatureStatus, reason: ProFeatureReason) -> Self {
        Self { status, reason }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == ProFeatureStatus::Enabled
    }
}

/// Evaluates a feature for a caller. Internal bypass wins over configuration.
pub fn evaluate_pro_feature(
    config: &ProFeatureConfig,
    is_pro: bool,
    is_internal: bool,
) -> ProFeatureDecision {
    use ProFeatureReason as R;
    use ProFeatureStatus as S;

    if is_internal {
        return ProFeatureDecision::new(S::Enabled, R::InternalBypass);
    }
    if !config.enabled {
        return ProFeatureDecision::new(S::Disabled, R::ConfigDisabled);
    }
    if is_pro {
        return ProFeatureDecision::new(S::Enabled, R::ProMember);
    }

    match (config.visibility_override, config.default_visibility) {
        (Some(FeatureVisibility::Locked), _) => ProFeatureDecision::new(S::Locked, R::OverrideLocked),
        (Some(FeatureVisibility::Hidden), _) => ProFeatureDecision::new(S::Hidden, R::OverrideHidden),
        (None, FeatureVisibility::Locked) => ProFeatureDecision::new(S::Locked, R::DefaultLocked),
        (None, FeatureVisibility::Hidden) => ProFeatureDecision::new(S::Hidden, R::DefaultHidden),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        enabled: bool,
        default_visibility: FeatureVisibility,
        visibility_override: Option<FeatureVisibility>,
    ) -> ProFeatureConfig {
        ProFeatureConfig {
            enabled,
            default_visibility,
            visibility_override,
        }
    }

    #[test]
    fn test_internal_bypass_beats_disabled_config() {
        let decision = evaluate_pro_feature(&config(false, FeatureVisibility::Hidden, None), false, true);
        assert_eq!(decision.status, ProFeatureStatus::Enabled);
        assert_eq!(decision.reason, ProFeatureReason::InternalBypass);
    }

    #[test]
    fn test_disabled_config_beats_pro() {
        let decision = evaluate_pro_feature(&config(false, FeatureVisibility::Locked, None), true, false);
        assert_eq!(decision.status, ProFeatureStatus::Disabled);
        assert_eq!(decision.reason, ProFeatureReason::ConfigDisabled);
    }

    #[test]
    fn test_pro_member_enabled() {
        let decision = evaluate_pro_feature(&ProFeatureConfig::default(), true, false);
        assert!(decision.is_enabled());
        assert_eq!(decision.reason, ProFeatureReason::ProMember);
    }

    #[test]
    fn test_visibility_for_non_pro() {
        let cases = [
            (FeatureVisibility::Locked, None, ProFeatureStatus::Locked, ProFeatureReason::DefaultLocked),
            (FeatureVisibility::Hidden, None, ProFeatureStatus::Hidden, ProFeatureReason::DefaultHidden),
            (
                FeatureVisibility::Locked,
                Some(FeatureVisibility::Hidden),
                ProFeatureStatus::Hidden,
                ProFeatureReason::OverrideHidden,
            ),
            (
                FeatureVisibility::Hidden,
                Some(FeatureVisibility::Locked),
                ProFeatureStatus::Locked,
                ProFeatureReason::OverrideLocked,
            ),
        ];
        for (default_visibility, visibility_override, status, reason) in cases {
            let decision =
                evaluate_pro_feature(&config(true, default_visibility, visibility_override), false, false);
            assert_eq!(decision, ProFeatureDecision { status, reason });
        }
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let cfg: ProFeatureConfig = serde_json::from_str(r#"{"default_visibility":"hidden"}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.default_visibility, FeatureVisibility::Hidden);
        assert_eq!(cfg.visibility_override, None);
    }
}
