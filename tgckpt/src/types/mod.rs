pub mod checkpoint_state;
pub mod process_id;
pub mod run_state;
pub mod snapshot;
