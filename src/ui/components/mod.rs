mod input;
mod key_result;
mod rename_prompt;

pub use key_result::KeyResult;
pub use rename_prompt::{RenameEvent, RenamePrompt};
