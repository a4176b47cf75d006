use std::path::PathBuf;

const DATA_DIR_NAME: &str = "usage-ledger";

/// `$XDG_DATA_HOME/usage-ledger`, falling back to `~/.local/share/usage-ledger`.
pub fn resolve_data_dir() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir).join(DATA_DIR_NAME));
    }
    let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join(DATA_DIR_NAME))
}
