pub mod acl;
pub mod auth_event;
pub mod challenge_code;
pub mod field;
pub mod principal;

pub use acl::Acl;
pub use auth_event::{
    AuthEvent, AuthMethod, Census, EmailConfig, EventStatus, MethodConfig, NewAuthEvent, PipeSpec,
    SmsConfig,
};
pub use challenge_code::ChallengeCode;
pub use field::{FieldDescriptor, FieldType, MAX_EXTRA_FIELDS, RESERVED_FIELD_NAMES};
pub use principal::{NewPrincipal, Principal, PrincipalStatus};
