mod retry;

pub use crate::retry::{Retry, retry};
