pub mod admission;
pub mod chat;
pub mod dispatcher;
pub mod live_class;
pub mod policy;

pub use admission::AdmissionService;
pub use chat::ChatService;
pub use dispatcher::{DispatchJob, Email, LogMailer, Mailer, NotificationDispatcher};
pub use live_class::LiveClassService;
pub use policy::{AdmissionPolicy, DirectJoinPolicy, RequestApprovalPolicy, policy_for};
