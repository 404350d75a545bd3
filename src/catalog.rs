//! Built-in node-type catalog, keyed by platform version.
//!
//! Each platform release ships a known set of node types; anything outside
//! that set is customer-authored content. The catalog is additive across
//! releases, so each version family lists only what it introduced.

use crate::types::NodeType;

static BUILTIN_6_0: &[&str] = &[
    "AccountLockout",
    "AgentDataStoreDecision",
    "AnonymousUser",
    "AuthLevelDecision",
    "ChoiceCollector",
    "CookiePresenceDecision",
    "CreatePassword",
    "DataStoreDecision",
    "InnerJourneyEvaluator",
    "LdapDecision",
    "MeterNode",
    "MessageNode",
    "ModifyAuthLevel",
    "OneTimePasswordCollectorDecision",
    "OneTimePasswordGenerator",
    "OneTimePasswordSmsSender",
    "OneTimePasswordSmtpSender",
    "PageNode",
    "PasswordCollector",
    "PersistentCookieDecision",
    "PollingWait",
    "PushAuthenticationSender",
    "PushResultVerifier",
    "RecoveryCodeCollectorDecision",
    "RecoveryCodeDisplay",
    "RetryLimitDecision",
    "ScriptedDecision",
    "SessionData",
    "SetFailureUrl",
    "SetPersistentCookie",
    "SetSessionProperties",
    "SetSuccessUrl",
    "SocialOAuthIgnoreProfile",
    "SocialOpenIdConnect",
    "TimerStart",
    "TimerStop",
    "UsernameCollector",
    "ZeroPageLogin",
];

static ADDED_6_5: &[&str] = &[
    "AccountActiveDecision",
    "AttributeCollector",
    "AttributePresentDecision",
    "AttributeValueDecision",
    "ConsentCollector",
    "CreateObject",
    "EmailSuspend",
    "EmailTemplate",
    "IdentifyExistingUser",
    "IncrementLoginCount",
    "KbaCreate",
    "KbaDecision",
    "KbaVerify",
    "LoginCountDecision",
    "PatchObject",
    "ProfileCompletenessDecision",
    "ProvisionDynamicAccount",
    "QueryFilterDecision",
    "RequiredAttributesDecision",
    "SelectIdentityProvider",
    "SocialProviderHandler",
    "TermsAndConditionsDecision",
    "TimeSinceDecision",
    "ValidatedPassword",
    "ValidatedUsername",
];

static ADDED_7_0: &[&str] = &[
    "AcceptTermsAndConditions",
    "AnonymousSessionUpgrade",
    "DeviceGeoFencing",
    "DeviceLocationMatch",
    "DeviceMatch",
    "DeviceProfileCollector",
    "DeviceSave",
    "DeviceTamperingVerification",
    "DisplayUserName",
    "WebAuthnAuthentication",
    "WebAuthnDeviceStorage",
    "WebAuthnRegistration",
];

static ADDED_7_1: &[&str] = &[
    "GetAuthenticatorApp",
    "MultiFactorRegistrationOptions",
    "OptOutMultiFactorAuthentication",
    "PushRegistration",
];

static ADDED_7_2: &[&str] = &[
    "CaptchaEnterprise",
    "CombinedMultiFactorRegistration",
    "OathRegistration",
    "OathTokenVerifier",
    "PassthroughAuthentication",
];

/// Built-in node types that host other nodes.
static CONTAINER_TYPES: &[&str] = &["PageNode"];

static FAMILIES_6_0: &[&[&str]] = &[BUILTIN_6_0];
static FAMILIES_6_5: &[&[&str]] = &[BUILTIN_6_0, ADDED_6_5];
static FAMILIES_7_0: &[&[&str]] = &[BUILTIN_6_0, ADDED_6_5, ADDED_7_0];
static FAMILIES_7_1: &[&[&str]] = &[BUILTIN_6_0, ADDED_6_5, ADDED_7_0, ADDED_7_1];
static FAMILIES_7_2: &[&[&str]] = &[BUILTIN_6_0, ADDED_6_5, ADDED_7_0, ADDED_7_1, ADDED_7_2];

/// Whether a node type hosts inner nodes.
pub fn is_container_type(node_type: &NodeType) -> bool {
    CONTAINER_TYPES.contains(&node_type.as_str())
}

/// The built-in node-type catalog for one platform version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    families: &'static [&'static [&'static str]],
}

impl Catalog {
    /// Resolve the catalog for a platform version string.
    ///
    /// Returns `None` for versions this build does not know; callers must
    /// then treat every node type as custom.
    pub fn for_version(version: &str) -> Option<Self> {
        let mut parts = version.split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor: u32 = parts.next().unwrap_or("0").parse().ok()?;

        let families: &'static [&'static [&'static str]] = match (major, minor) {
            (6, 0) => FAMILIES_6_0,
            (6, 5) => FAMILIES_6_5,
            (7, 0) => FAMILIES_7_0,
            (7, 1) => FAMILIES_7_1,
            (7, 2) => FAMILIES_7_2,
            _ => return None,
        };
        Some(Self { families })
    }

    /// Whether a node type is in the built-in set for this version.
    pub fn is_builtin(&self, node_type: &NodeType) -> bool {
        let tag = node_type.as_str();
        self.families.iter().any(|family| family.contains(&tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogs_are_additive() {
        let v6 = Catalog::for_version("6.0.0").unwrap();
        let v72 = Catalog::for_version("7.2.0").unwrap();
        let t = NodeType::from("UsernameCollector");
        assert!(v6.is_builtin(&t));
        assert!(v72.is_builtin(&t));

        let added = NodeType::from("OathRegistration");
        assert!(!v6.is_builtin(&added));
        assert!(v72.is_builtin(&added));
    }

    #[test]
    fn test_unknown_version_has_no_catalog() {
        assert!(Catalog::for_version("8.0.0").is_none());
        assert!(Catalog::for_version("garbage").is_none());
    }

    #[test]
    fn test_custom_types_are_not_builtin() {
        let v72 = Catalog::for_version("7.2.0").unwrap();
        assert!(!v72.is_builtin(&NodeType::from("CustomScriptNode")));
    }
}
