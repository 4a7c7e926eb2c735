//! Filesystem helpers for the embedded `PostgreSQL` cluster.

use super::BoxError;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use postgresql_embedded::Settings;
use std::io::ErrorKind;
use std::path::Path;

fn open_dir(path: &Utf8Path) -> Result<Dir, BoxError> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|err| Box::new(err) as BoxError)
}

/// Reads `file` under `dir`, treating a missing file as `None`.
fn read_optional(dir: &Path, file: &str) -> Result<Option<String>, BoxError> {
    let dir = dir.to_string_lossy();
    let dir = open_dir(Utf8Path::new(dir.as_ref()))?;
    match dir.read_to_string(file) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Box::new(err) as BoxError),
    }
}

/// Adopts the generated superuser password when bootstrap wrote one.
pub(super) fn sync_password_from_file(settings: &mut Settings) -> Result<(), BoxError> {
    let password_path = settings.password_file.to_string_lossy().into_owned();
    let password_path = Utf8Path::new(&password_path);
    let Some(file_name) = password_path.file_name() else {
        return Err(Box::new(std::io::Error::other(
            "password file path must include a file name",
        )));
    };
    let parent = password_path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let Some(contents) = read_optional(parent.as_std_path(), file_name)? else {
        return Ok(());
    };
    let password = contents.trim_end();
    if !password.is_empty() {
        password.clone_into(&mut settings.password);
    }
    Ok(())
}

/// Adopts the port the server actually bound, read from `postmaster.pid`.
pub(super) fn sync_port_from_pid(settings: &mut Settings) -> Result<(), BoxError> {
    let Some(contents) = read_optional(&settings.data_dir, "postmaster.pid")? else {
        return Ok(());
    };
    // Line four of postmaster.pid holds the port.
    if let Some(port) = contents
        .lines()
        .nth(3)
        .and_then(|line| line.trim().parse::<u16>().ok())
    {
        settings.port = port;
    }
    Ok(())
}
