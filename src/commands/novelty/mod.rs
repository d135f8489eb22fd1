mod output;
mod run;
mod types;

pub use run::run;

use output::*;
use types::*;
