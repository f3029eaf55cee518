// notetally-common: note model and checklist convention shared by the
// daemon and CLI.

pub mod note;
pub mod todo;
pub mod types;
