//! Tests for strongly-typed identifiers and the deployment environment

use core_kernel::{
    DeploymentEnvironment, InvitationId, OrganisationId, PersonId, QuoteAggregateId, QuoteId,
    TenantId, UpdaterJobId, UserId,
};
use uuid::Uuid;

mod quote_aggregate_id_tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        assert_ne!(QuoteAggregateId::new(), QuoteAggregateId::new());
    }

    #[test]
    fn test_new_v7_generates_time_ordered_ids() {
        let id1 = QuoteAggregateId::new_v7();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let id2 = QuoteAggregateId::new_v7();
        let uuid1: Uuid = id1.into();
        let uuid2: Uuid = id2.into();
        assert!(uuid1 < uuid2);
    }

    #[test]
    fn test_from_str_with_and_without_prefix() {
        let original = QuoteAggregateId::new();
        let with_prefix: QuoteAggregateId = original.to_string().parse().unwrap();
        let bare: QuoteAggregateId = original.as_uuid().to_string().parse().unwrap();
        assert_eq!(original, with_prefix);
        assert_eq!(original, bare);
    }

    #[test]
    fn test_json_serialization_is_transparent() {
        let id = QuoteAggregateId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}

mod prefix_tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(TenantId::prefix(), "TNT");
        assert_eq!(OrganisationId::prefix(), "ORG");
        assert_eq!(QuoteId::prefix(), "QTE");
        assert_eq!(PersonId::prefix(), "PER");
        assert_eq!(UserId::prefix(), "USR");
        assert_eq!(InvitationId::prefix(), "INVT");
        assert_eq!(UpdaterJobId::prefix(), "UPJ");
    }

    #[test]
    fn test_invalid_string_fails_to_parse() {
        assert!("USR-not-a-uuid".parse::<UserId>().is_err());
    }
}

mod environment_tests {
    use super::*;

    #[test]
    fn test_default_is_production() {
        assert_eq!(DeploymentEnvironment::default(), DeploymentEnvironment::Production);
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&DeploymentEnvironment::Development).unwrap();
        assert_eq!(json, "\"development\"");
        assert_eq!(DeploymentEnvironment::Staging.to_string(), "staging");
    }
}
