pub mod acl;
pub mod admin;
pub mod captcha;
pub mod codes;
pub mod error;
pub mod flow;
pub(crate) mod ident;
pub mod lookup;
pub mod notify;
pub mod paging;
pub mod token;

pub use acl::{AclFilter, PermissionService};
pub use admin::{AdminService, CensusAddOutcome, CreateEventRequest, SendCodesOutcome};
pub use captcha::CaptchaVerifier;
pub use codes::CodeService;
pub use error::ServiceError;
pub use flow::{AuthFlow, AuthOutcome, AuthReply, RegisterOutcome};
pub use lookup::{ExternalLookup, HttpLookup, LookupOutcome};
pub use notify::{Channel, ConsoleNotifier, Notifier, RenderedMessage};
pub use paging::{Page, PageParams};
pub use token::TokenCodec;
