//! Domain model (ids, arguments, task specs, errors).

pub mod arg;
pub mod errors;
pub mod ids;
pub mod spec;

pub use arg::TaskArg;
pub use errors::{ConnectionError, DecodeError, IdError, PinError, SpindleError};
pub use ids::{FunctionId, ID_LEN, ObjectId, TaskId, UniqueId};
pub use spec::{TaskSpec, TaskSpecBuilder, derive_return_id, derive_task_id};
