use thiserror::Error;

/// Pool-level error: construction, resize and shutdown failures.
///
/// Failures of individual tasks are never reported through this type; they are
/// delivered to the task's own handle as a [`TaskError`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn worker_spawn(spawned: usize, requested: usize, source: std::io::Error) -> Error {
        Error(
            ErrorKind::WorkerSpawn {
                spawned,
                requested,
                source,
            }
            .into(),
        )
    }

    pub fn config<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Config {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("failed to spawn worker thread ({spawned} of {requested} spawned): {source}")]
    WorkerSpawn {
        spawned: usize,
        requested: usize,
        source: std::io::Error,
    },

    #[error("invalid configuration '{context}': {source}")]
    Config {
        context: String,
        source: StdErrorBoxed,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

/// The failure side of a task's result.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The callable panicked; `message` is the panic payload when it was a string.
    #[error("task panicked: {message}")]
    Panicked { message: String },

    /// A fallible callable returned an error.
    #[error("task failed: {source}")]
    Failed { source: StdErrorBoxed },

    /// The pool was shut down before any worker withdrew the task.
    #[error("pool shut down before the task was executed")]
    NotExecuted,

    /// The handle already delivered its result.
    #[error("task result was already retrieved")]
    AlreadyRetrieved,
}

impl TaskError {
    pub fn failed<E>(source: E) -> TaskError
    where
        E: Into<StdErrorBoxed>,
    {
        TaskError::Failed {
            source: source.into(),
        }
    }

    pub fn is_not_executed(&self) -> bool {
        matches!(self, TaskError::NotExecuted)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked { .. })
    }
}
