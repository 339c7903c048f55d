use crate::rpn::RpnError;

/// Convenient alias for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the engine.
///
/// The wire representation is a negative integer code partitioned by module
/// (general, hierarchy, subscriptions, filters); see [`Error::code`] and
/// [`reply_message`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unclassified failure.
    #[error("unknown error")]
    General,

    /// The requested operation is not supported.
    #[error("operation not supported")]
    NotSupported,

    /// An argument or input value was invalid.
    #[error("invalid argument or input value")]
    Invalid,

    /// An allocation was refused.
    #[error("out of memory")]
    OutOfMemory,

    /// The addressed key, node or element does not exist.
    #[error("not found")]
    NotFound,

    /// The element already exists.
    #[error("already exists")]
    Exists,

    /// The value exists but has an incompatible type.
    #[error("wrong value type")]
    WrongType,

    /// A dotted path exceeded the key length cap.
    #[error("key name too long")]
    NameTooLong,

    /// The object reached its immediate key count cap.
    #[error("maximum object size reached")]
    ObjectTooBig,

    /// A snapshot was written by an incompatible encoding version.
    #[error("snapshot encoding version mismatch")]
    VersionMismatch,

    /// A snapshot payload could not be decoded.
    #[error("corrupted snapshot: {0}")]
    Corrupt(String),

    /// Unclassified hierarchy failure.
    #[error("hierarchy: unknown error")]
    HierarchyGeneral,

    /// The hierarchy does not support the requested operation.
    #[error("hierarchy: operation not supported")]
    HierarchyNotSupported,

    /// A hierarchy argument was invalid; notably edges that would form a cycle.
    #[error("hierarchy: invalid argument or input value")]
    HierarchyInvalid,

    /// A hierarchy allocation was refused.
    #[error("hierarchy: out of memory")]
    HierarchyOutOfMemory,

    /// The addressed node does not exist.
    #[error("hierarchy: not found")]
    HierarchyNotFound,

    /// The node already exists.
    #[error("hierarchy: already exists")]
    HierarchyExists,

    /// Unclassified subscription failure.
    #[error("subscriptions: unknown error")]
    SubscriptionsGeneral,

    /// A subscription argument was invalid.
    #[error("subscriptions: invalid argument or input value")]
    SubscriptionsInvalid,

    /// A subscription allocation was refused.
    #[error("subscriptions: out of memory")]
    SubscriptionsOutOfMemory,

    /// The addressed subscription does not exist.
    #[error("subscriptions: not found")]
    SubscriptionsNotFound,

    /// The subscription already exists.
    #[error("subscriptions: already exists")]
    SubscriptionsExists,

    /// A filter expression failed to compile.
    #[error("filter expression compilation failed")]
    RpnCompile,

    /// A filter expression failed to evaluate.
    #[error("filter evaluation failed: {0}")]
    Rpn(#[from] RpnError),
}

impl Error {
    pub(crate) fn corrupt<T: std::fmt::Display>(msg: T) -> Self {
        Self::Corrupt(msg.to_string())
    }

    /// Returns the negative integer wire code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::General => -1,
            Error::NotSupported => -2,
            Error::Invalid => -3,
            Error::OutOfMemory => -4,
            Error::NotFound => -5,
            Error::Exists => -6,
            Error::WrongType => -7,
            Error::NameTooLong => -8,
            Error::ObjectTooBig => -9,
            Error::VersionMismatch => -10,
            Error::Corrupt(_) => -3,
            Error::HierarchyGeneral => -11,
            Error::HierarchyNotSupported => -12,
            Error::HierarchyInvalid => -13,
            Error::HierarchyOutOfMemory => -14,
            Error::HierarchyNotFound => -15,
            Error::HierarchyExists => -16,
            Error::SubscriptionsGeneral => -17,
            Error::SubscriptionsInvalid => -18,
            Error::SubscriptionsOutOfMemory => -19,
            Error::SubscriptionsNotFound => -20,
            Error::SubscriptionsExists => -21,
            Error::RpnCompile => -22,
            Error::Rpn(_) => -23,
        }
    }

    /// Lifts a general-space error into the subscriptions code space.
    pub(crate) fn into_subscriptions(self) -> Self {
        match self {
            Error::General => Error::SubscriptionsGeneral,
            Error::Invalid => Error::SubscriptionsInvalid,
            Error::OutOfMemory => Error::SubscriptionsOutOfMemory,
            Error::NotFound => Error::SubscriptionsNotFound,
            Error::Exists => Error::SubscriptionsExists,
            other => other,
        }
    }
}

/// Human-readable message table indexed by `-code`.
const REPLY_MESSAGES: [&str; 24] = [
    "ERR No error",
    "ERR EGENERAL Unknown error",
    "ERR ENOTSUP Operation not supported",
    "ERR EINVAL Invalid argument or input value",
    "ERR ENOMEM Out of memory",
    "ERR ENOENT Not found",
    "ERR EEXIST Exist",
    "ERR EINTYPE Wrong value type",
    "ERR ENAMETOOLONG Key name too long",
    "ERR EOBIG Maximum object size reached",
    "ERR EVERSION Encoding version mismatch",
    "ERR_HIERARCHY EGENERAL Unknown error",
    "ERR_HIERARCHY ENOTSUP Operation not supported",
    "ERR_HIERARCHY EINVAL Invalid argument or input value",
    "ERR_HIERARCHY ENOMEM Out of memory",
    "ERR_HIERARCHY ENOENT Not found",
    "ERR_HIERARCHY EEXIST Exist",
    "ERR_SUBSCRIPTIONS EGENERAL Unknown error",
    "ERR_SUBSCRIPTIONS EINVAL Invalid argument or input value",
    "ERR_SUBSCRIPTIONS ENOMEM Out of memory",
    "ERR_SUBSCRIPTIONS ENOENT Not found",
    "ERR_SUBSCRIPTIONS EEXIST Exist",
    "ERR_RPN ECOMP Expression compilation failed",
    "ERR_RPN EFAIL Expression evaluation failed",
];

/// Maps an error code to its reply message.
///
/// Unknown or non-negative codes are clamped to the generic error entry,
/// so a reply can always be formatted.
pub fn reply_message(code: i32) -> &'static str {
    if code >= 0 || -code >= REPLY_MESSAGES.len() as i32 {
        return REPLY_MESSAGES[1];
    }
    REPLY_MESSAGES[(-code) as usize]
}
