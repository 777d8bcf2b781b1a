//! Path helpers for values coming from the config file.

use std::path::PathBuf;

/// Expand a leading `~/` to the user's home directory. Config files written
/// by hand often point the database at `~/...`; SQLite would otherwise
/// create a literal `./~` directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(path.trim_start_matches("~/"));
    }
    PathBuf::from(path)
}
