//! Tool directives embedded in generated replies.
//!
//! The model asks for side effects by writing markup into its reply. The
//! dispatcher extracts the markup, executes it, and strips it before the text
//! reaches the channel.

pub mod transmit;

pub use transmit::{DirectiveResult, ToolDirective, execute_directive, parse_directive};
