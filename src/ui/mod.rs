//! Console output for the CLI
//!
//! Uses `cliclack` framing and spinners on a terminal, with plain
//! line-oriented output when stdout is piped or running under CI.
//!
//! ```rust,ignore
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Syncing cache...");
//! spinner.stop("Cache synced");
//!
//! if ui::confirm(&ctx, "Remove list 'egi'?", false).await? { ... }
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    format_bytes, intro, key_value, key_value_status, outro_success, outro_warn, step_error_detail,
    step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{ListProgress, TaskSpinner};
pub use prompts::confirm;
