pub mod decode;
pub mod prune;
pub mod run;

pub use decode::handle_decode;
pub use prune::handle_prune_history;
pub use run::handle_run;
