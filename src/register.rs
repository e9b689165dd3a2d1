//! URL scheme registration.
//!
//! Lets the peer launch the application through a `discord-<app id>://` URL,
//! which is how join and spectate invitations start a game that is not
//! running yet. On Linux this writes a `.desktop` entry into the user's
//! applications directory and makes it the default handler with `xdg-mime`.
//! Other platforms are not handled here.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Register `command` as the launcher for `app_id`.
///
/// With `command` unset the current executable is used.
///
/// # Errors
///
/// Fails if the executable path or the applications directory cannot be
/// determined, or the desktop entry cannot be written. A failing `xdg-mime`
/// is only logged.
pub fn register(app_id: &str, command: Option<&str>) -> Result<()> {
    let command = match command {
        Some(command) => command.to_string(),
        None => std::env::current_exe()?.display().to_string(),
    };
    register_command(app_id, &command)
}

/// Register a Steam game: invitations launch it through the Steam client.
pub fn register_steam_game(app_id: &str, steam_id: &str) -> Result<()> {
    register_command(app_id, &format!("xdg-open steam://rungameid/{steam_id}"))
}

#[cfg(target_os = "linux")]
fn register_command(app_id: &str, command: &str) -> Result<()> {
    let dir = applications_dir().ok_or_else(|| {
        crate::error::RpcError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "neither XDG_DATA_HOME nor HOME is set",
        ))
    })?;
    let path = write_desktop_file(&dir, app_id, command)?;
    debug!(path = %path.display(), "wrote desktop entry");

    let status = std::process::Command::new("xdg-mime")
        .arg("default")
        .arg(desktop_file_name(app_id))
        .arg(scheme_mime_type(app_id))
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!(%status, "xdg-mime did not register the URL handler"),
        Err(e) => tracing::warn!(error = %e, "cannot run xdg-mime"),
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn register_command(app_id: &str, _command: &str) -> Result<()> {
    debug!(app_id, "URL scheme registration is not supported on this platform");
    Ok(())
}

/// `$XDG_DATA_HOME/applications`, else `$HOME/.local/share/applications`.
pub fn applications_dir() -> Option<PathBuf> {
    let non_empty = |var: &str| std::env::var_os(var).filter(|value| !value.is_empty());
    if let Some(data_home) = non_empty("XDG_DATA_HOME") {
        return Some(PathBuf::from(data_home).join("applications"));
    }
    non_empty("HOME").map(|home| PathBuf::from(home).join(".local/share/applications"))
}

fn desktop_file_name(app_id: &str) -> String {
    format!("discord-{app_id}.desktop")
}

fn scheme_mime_type(app_id: &str) -> String {
    format!("x-scheme-handler/discord-{app_id}")
}

/// Contents of the desktop entry for `app_id`.
pub fn desktop_entry(app_id: &str, command: &str) -> String {
    format!(
        "[Desktop Entry]\n\
         Name=Game {app_id}\n\
         Exec={command} %u\n\
         Type=Application\n\
         NoDisplay=true\n\
         Categories=Discord;Games;\n\
         MimeType={mime};\n",
        mime = scheme_mime_type(app_id),
    )
}

/// Write the desktop entry into `dir`, creating it if needed.
pub fn write_desktop_file(dir: &Path, app_id: &str, command: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(desktop_file_name(app_id));
    std::fs::write(&path, desktop_entry(app_id, command))?;
    Ok(path)
}
