/// Enumerated outcome of a task or registry operation.
///
/// Every `Execute`/`Broadcast` invocation resolves exactly once with one of
/// these codes; callers never need to distinguish "the task was lost" from
/// "the task completed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    AlreadyExists,
    NotFound,
    ModuleNotFound,
    FunctionNotFound,
    ExecutionError,
    Timeout,
    Terminated,
    InternalError,
}

impl ResultCode {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// `{ code, payload }` as carried through a completion callback.
///
/// `payload` is opaque marshalled bytes on success, and the exception's
/// textual form (UTF-8 encoded) for the error codes that carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub code: ResultCode,
    pub payload: Vec<u8>,
}

impl TaskResult {
    #[must_use]
    pub fn success(payload: Vec<u8>) -> Self {
        Self {
            code: ResultCode::Success,
            payload,
        }
    }

    #[must_use]
    pub fn error(code: ResultCode, message: impl Into<String>) -> Self {
        debug_assert!(!code.is_success(), "error() called with ResultCode::Success");
        Self {
            code,
            payload: message.into().into_bytes(),
        }
    }

    #[must_use]
    pub fn timeout() -> Self {
        Self {
            code: ResultCode::Timeout,
            payload: Vec::new(),
        }
    }

    #[must_use]
    pub fn terminated() -> Self {
        Self {
            code: ResultCode::Terminated,
            payload: Vec::new(),
        }
    }

    /// Renders the payload as a lossy UTF-8 string, for error codes that
    /// carry a textual message rather than a marshalled value.
    #[must_use]
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
