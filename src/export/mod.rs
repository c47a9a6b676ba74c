//! Export functionality: saving attachments to a directory.

pub mod attachment;
