mod build;
mod inspect;
mod show;

pub use build::*;
pub use inspect::*;
pub use show::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}
