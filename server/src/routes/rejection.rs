use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self, hide_detail: bool) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: if hide_detail {
                "internal error".to_owned()
            } else {
                format!("{}", self.error)
            },
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

/// Which operation a failed request was performing, echoed in the error
/// body alongside the message.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Context {
    ActiveSession,
    CreateSession,
    CurrentReport,
    DeleteMember { id: String },
    Mark { session: Option<String>, member: Option<String> },
    ManualMark { member: Option<String> },
    Members,
    MembershipReport,
    Register,
    Stats { id: String },
}

impl Context {
    pub fn active_session() -> Context {
        Context::ActiveSession
    }

    pub fn create_session() -> Context {
        Context::CreateSession
    }

    pub fn current_report() -> Context {
        Context::CurrentReport
    }

    pub fn delete_member(id: String) -> Context {
        Context::DeleteMember { id }
    }

    pub fn mark(session: Option<String>, member: Option<String>) -> Context {
        Context::Mark { session, member }
    }

    pub fn manual_mark(member: Option<String>) -> Context {
        Context::ManualMark { member }
    }

    pub fn members() -> Context {
        Context::Members
    }

    pub fn membership_report() -> Context {
        Context::MembershipReport
    }

    pub fn register() -> Context {
        Context::Register
    }

    pub fn stats(id: String) -> Context {
        Context::Stats { id }
    }
}
