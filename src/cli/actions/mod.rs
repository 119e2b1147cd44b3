pub mod admin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Stats,
    Users,
    AiUsage,
    Usage { uid: Option<String> },
    ResetPassword { target: String },
}
