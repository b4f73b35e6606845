// Document versions: upload, edit-save, listing, and export.
// Every write appends a new version; nothing here mutates an existing row.

pub mod extract;
pub mod handlers;
pub mod render;
