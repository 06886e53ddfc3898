//! Party Domain
//!
//! Event-sourced people, user accounts and organisations.
//!
//! - [`PersonAggregate`]: a person's contact details, optionally linked to
//!   a user account
//! - [`UserAggregate`]: login identity with roles, blocking, activation
//!   and password reset through time-limited invitations
//! - [`OrganisationAggregate`]: a tenant's organisation with a unique,
//!   URL-safe alias
//!
//! Passwords are hashed through the [`PasswordHasher`] port;
//! [`Argon2PasswordHasher`] is the production implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut user = UserAggregate::create(new_user, Some(admin_id))?;
//! let invitation = user.create_activation_invitation(Utc::now(), Some(admin_id))?;
//! user.activate(invitation, "s3cret-password", &Argon2PasswordHasher::new(), Utc::now())?;
//! user.verify_login("s3cret-password", &Argon2PasswordHasher::new())?;
//! ```

pub mod error;
pub mod events;
pub mod organisation;
pub mod password;
pub mod person;
pub mod user;
pub mod validation;

pub use error::PartyError;
pub use events::{OrganisationEvent, PersonEvent, UserEvent};
pub use organisation::OrganisationAggregate;
pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use person::{PersonAggregate, PersonDetails};
pub use user::{Invitation, NewUser, UserAggregate, INVITATION_VALIDITY_DAYS};
pub use validation::ValidationResult;
