/// Opaque handle to the cross-VM value transport's context.
///
/// The core never inspects this value; it is threaded through from the
/// submitter to the engine collaborator unchanged, the way a file
/// descriptor is passed through a layer that never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportContext(pub u64);

/// Per-call tuning the submitter controls.
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    /// Zero means "use the zone's default timeout"; see `ZoneSettings`.
    pub timeout_ms: u32,
    pub transport_context: TransportContext,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            transport_context: TransportContext::default(),
        }
    }
}

/// Module/function identification plus arguments for a `CallTask`.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub module: String,
    pub function: String,
    pub arguments: Vec<u8>,
    pub options: CallOptions,
}

impl FunctionSpec {
    #[must_use]
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            arguments: Vec::new(),
            options: CallOptions::default(),
        }
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<u8>) -> Self {
        self.arguments = arguments;
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }
}
