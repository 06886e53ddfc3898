//! Tests for the party aggregates

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use core_kernel::mock::InMemoryEventStore;
use core_kernel::{AggregateRepository, EventSourced, OrganisationId, PersonId, TenantId, UserId};

use domain_party::{
    NewUser, OrganisationAggregate, PartyError, PasswordHasher, PersonAggregate, PersonDetails,
    UserAggregate,
};

/// Cheap hasher so tests don't pay for argon2
struct ReversedHasher;

impl PasswordHasher for ReversedHasher {
    fn hash(&self, password: &str) -> Result<String, PartyError> {
        Ok(password.chars().rev().collect())
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PartyError> {
        Ok(password.chars().rev().collect::<String>() == hash)
    }
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

// ============================================================================
// Person Tests
// ============================================================================

mod person_tests {
    use super::*;

    fn person() -> PersonAggregate {
        PersonAggregate::create(
            TenantId::new(),
            PersonId::new(),
            OrganisationId::new(),
            PersonDetails::named("Jo Citizen").with_email("jo@example.com"),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_create_person() {
        let person = person();
        assert_eq!(person.details().full_name, "Jo Citizen");
        assert_eq!(person.details().display_name(), "Jo Citizen");
        assert!(person.user_id().is_none());
        assert_eq!(person.version(), 1);
    }

    #[test]
    fn test_invalid_email_rejected() {
        let result = PersonAggregate::create(
            TenantId::new(),
            PersonId::new(),
            OrganisationId::new(),
            PersonDetails::named("Jo").with_email("nope"),
            None,
        );
        assert!(matches!(result, Err(PartyError::ValidationFailed(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = PersonAggregate::create(
            TenantId::new(),
            PersonId::new(),
            OrganisationId::new(),
            PersonDetails::default(),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_phone_rejected() {
        let mut details = PersonDetails::named("Jo");
        details.mobile_phone = Some("call me".to_string());
        assert!(details.check().is_err());
    }

    #[test]
    fn test_unchanged_details_raise_nothing() {
        let mut person = person();
        let details = person.details().clone();
        person.update_details(details, None).unwrap();
        assert_eq!(person.version(), 1);

        let mut changed = person.details().clone();
        changed.preferred_name = Some("Jo".to_string());
        person.update_details(changed, None).unwrap();
        assert_eq!(person.version(), 2);
        assert_eq!(person.details().display_name(), "Jo");
    }

    #[test]
    fn test_user_account_linked_once() {
        let mut person = person();
        person.link_user_account(UserId::new(), None).unwrap();

        let err = person.link_user_account(UserId::new(), None).unwrap_err();
        assert!(matches!(err, PartyError::AlreadyLinked(_)));
    }

    #[test]
    fn test_deleted_person_rejects_updates() {
        let mut person = person();
        person.delete(None).unwrap();

        assert!(person.is_deleted());
        assert!(matches!(
            person.update_details(PersonDetails::named("Other"), None),
            Err(PartyError::PersonDeleted)
        ));
        assert!(matches!(person.delete(None), Err(PartyError::PersonDeleted)));
    }
}

// ============================================================================
// User Tests
// ============================================================================

mod user_tests {
    use super::*;

    fn user() -> UserAggregate {
        UserAggregate::create(
            NewUser {
                tenant_id: TenantId::new(),
                user_id: UserId::new(),
                organisation_id: OrganisationId::new(),
                person_id: PersonId::new(),
                login_email: "Agent@Example.com".to_string(),
                roles: vec!["Agent".to_string()],
            },
            None,
        )
        .unwrap()
    }

    fn activated_user() -> UserAggregate {
        let mut user = user();
        let invitation = user.create_activation_invitation(at(2026, 1, 1), None).unwrap();
        user.activate(invitation, "password123", &ReversedHasher, at(2026, 1, 2))
            .unwrap();
        user
    }

    #[test]
    fn test_login_email_is_lowercased() {
        assert_eq!(user().login_email(), "agent@example.com");
    }

    #[test]
    fn test_duplicate_roles_rejected() {
        let mut user = user();
        assert!(matches!(user.add_role("agent", None), Err(PartyError::DuplicateRole(_))));

        user.add_role("Underwriter", None).unwrap();
        assert!(user.has_role("underwriter"));
        assert_eq!(user.roles().len(), 2);
    }

    #[test]
    fn test_duplicate_roles_rejected_on_create() {
        let result = UserAggregate::create(
            NewUser {
                tenant_id: TenantId::new(),
                user_id: UserId::new(),
                organisation_id: OrganisationId::new(),
                person_id: PersonId::new(),
                login_email: "a@example.com".to_string(),
                roles: vec!["Agent".to_string(), "Agent".to_string()],
            },
            None,
        );
        assert!(matches!(result, Err(PartyError::DuplicateRole(_))));
    }

    #[test]
    fn test_retracting_unassigned_role_rejected() {
        let mut user = user();
        assert!(matches!(
            user.retract_role("Underwriter", None),
            Err(PartyError::RoleNotAssigned(_))
        ));

        user.retract_role("Agent", None).unwrap();
        assert!(user.roles().is_empty());
    }

    #[test]
    fn test_block_and_unblock() {
        let mut user = user();
        user.block(None).unwrap();
        assert!(matches!(user.block(None), Err(PartyError::AlreadyBlocked)));

        user.unblock(None).unwrap();
        assert!(matches!(user.unblock(None), Err(PartyError::NotBlocked)));
    }

    #[test]
    fn test_activation_with_live_invitation() {
        let user = activated_user();
        assert!(user.is_activated());
        assert!(user.activation_invitation().is_none());
        assert!(user.verify_login("password123", &ReversedHasher).is_ok());
    }

    #[test]
    fn test_activation_only_once() {
        let mut user = activated_user();
        assert!(matches!(
            user.create_activation_invitation(at(2026, 1, 3), None),
            Err(PartyError::AlreadyActivated)
        ));
    }

    #[test]
    fn test_expired_invitation_rejected() {
        let mut user = user();
        let issued = at(2026, 1, 1);
        let invitation = user.create_activation_invitation(issued, None).unwrap();

        let err = user
            .activate(invitation, "password123", &ReversedHasher, issued + Duration::days(7))
            .unwrap_err();
        assert!(matches!(err, PartyError::InvitationExpired));
    }

    #[test]
    fn test_superseded_invitation_rejected() {
        let mut user = user();
        let first = user.create_activation_invitation(at(2026, 1, 1), None).unwrap();
        let _second = user.create_activation_invitation(at(2026, 1, 2), None).unwrap();

        let err = user
            .activate(first, "password123", &ReversedHasher, at(2026, 1, 2))
            .unwrap_err();
        assert!(matches!(err, PartyError::InvitationNotFound(_)));
    }

    #[test]
    fn test_weak_password_rejected() {
        let mut user = user();
        let invitation = user.create_activation_invitation(at(2026, 1, 1), None).unwrap();
        let err = user
            .activate(invitation, "short", &ReversedHasher, at(2026, 1, 1))
            .unwrap_err();
        assert!(matches!(err, PartyError::ValidationFailed(_)));
        assert!(!user.is_activated());
    }

    #[test]
    fn test_password_reset_requires_activation() {
        let mut user = user();
        assert!(matches!(
            user.create_password_reset_invitation(at(2026, 1, 1), None),
            Err(PartyError::NotActivated)
        ));
    }

    #[test]
    fn test_password_reset_flow() {
        let mut user = activated_user();
        let invitation = user
            .create_password_reset_invitation(at(2026, 2, 1), None)
            .unwrap();
        user.reset_password(invitation, "newpassword9", &ReversedHasher, at(2026, 2, 2))
            .unwrap();

        assert!(user.reset_invitation().is_none());
        assert!(matches!(
            user.verify_login("password123", &ReversedHasher),
            Err(PartyError::InvalidCredentials)
        ));
        assert!(user.verify_login("newpassword9", &ReversedHasher).is_ok());

        // The invitation is consumed
        assert!(matches!(
            user.reset_password(invitation, "another1pass", &ReversedHasher, at(2026, 2, 2)),
            Err(PartyError::InvitationNotFound(_))
        ));
    }

    #[test]
    fn test_change_password_checks_current() {
        let mut user = activated_user();
        assert!(matches!(
            user.change_password("wrong-one-1", "newpassword9", &ReversedHasher),
            Err(PartyError::InvalidCredentials)
        ));
        user.change_password("password123", "newpassword9", &ReversedHasher)
            .unwrap();
        assert!(user.verify_login("newpassword9", &ReversedHasher).is_ok());
    }

    #[test]
    fn test_login_failures() {
        let user = user();
        assert!(matches!(
            user.verify_login("password123", &ReversedHasher),
            Err(PartyError::NotActivated)
        ));

        let mut user = activated_user();
        user.block(None).unwrap();
        assert!(matches!(
            user.verify_login("password123", &ReversedHasher),
            Err(PartyError::UserBlocked)
        ));
    }

    #[tokio::test]
    async fn test_user_round_trips_through_store() {
        let repository: AggregateRepository<UserAggregate> =
            AggregateRepository::new(Arc::new(InMemoryEventStore::new()));
        let mut user = activated_user();
        user.add_role("Underwriter", None).unwrap();
        repository.save(&mut user).await.unwrap();

        let loaded = repository
            .get(user.tenant_id(), user.aggregate_id())
            .await
            .unwrap();
        assert_eq!(loaded.version(), user.version());
        assert!(loaded.is_activated());
        assert!(loaded.has_role("underwriter"));
        assert!(loaded.verify_login("password123", &ReversedHasher).is_ok());
    }
}

// ============================================================================
// Organisation Tests
// ============================================================================

mod organisation_tests {
    use super::*;

    fn organisation() -> OrganisationAggregate {
        OrganisationAggregate::create(TenantId::new(), OrganisationId::new(), "Acme Brokers", "acme", None)
            .unwrap()
    }

    #[test]
    fn test_create_validates_alias_and_name() {
        assert!(OrganisationAggregate::create(TenantId::new(), OrganisationId::new(), "Acme", "Acme!", None)
            .is_err());
        assert!(OrganisationAggregate::create(TenantId::new(), OrganisationId::new(), " ", "acme", None)
            .is_err());

        let org = organisation();
        assert!(org.is_active());
        assert_eq!(org.alias(), "acme");
    }

    #[test]
    fn test_rename_without_change_raises_nothing() {
        let mut org = organisation();
        org.rename("Acme Brokers", None).unwrap();
        assert_eq!(org.version(), 1);

        org.rename("Acme Insurance Brokers", None).unwrap();
        assert_eq!(org.name(), "Acme Insurance Brokers");
        assert_eq!(org.version(), 2);
    }

    #[test]
    fn test_change_alias() {
        let mut org = organisation();
        org.change_alias("acme-brokers", None).unwrap();
        assert_eq!(org.alias(), "acme-brokers");
        assert!(org.change_alias("-bad", None).is_err());
    }

    #[test]
    fn test_disable_and_activate() {
        let mut org = organisation();
        assert!(matches!(org.activate(None), Err(PartyError::AlreadyActive)));

        org.disable(None).unwrap();
        assert!(!org.is_active());
        assert!(matches!(org.disable(None), Err(PartyError::AlreadyDisabled)));

        org.activate(None).unwrap();
        assert!(org.is_active());
    }

    #[test]
    fn test_deleted_organisation_rejects_everything() {
        let mut org = organisation();
        org.delete(None).unwrap();

        assert!(matches!(org.rename("New", None), Err(PartyError::OrganisationDeleted)));
        assert!(matches!(org.change_alias("new", None), Err(PartyError::OrganisationDeleted)));
        assert!(matches!(org.disable(None), Err(PartyError::OrganisationDeleted)));
        assert!(matches!(org.activate(None), Err(PartyError::OrganisationDeleted)));
        assert!(matches!(org.delete(None), Err(PartyError::OrganisationDeleted)));
    }
}
