pub(crate) mod invite;
pub(crate) mod ping;

use crate::{CommandResult, Context};
