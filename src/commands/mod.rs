mod contexts;
mod keys;
mod stacks;

pub use contexts::run_contexts;
pub use keys::run_keys;
pub use stacks::{
    parse_params, run_describe, run_destroy, run_init, run_lifecycle, run_list, run_sync,
    run_up, LifecycleOp,
};
