//! Ambient properties derived from the host process.
//!
//! These are injected into every execution context before any configured
//! property, so explicit properties and property files can override them.

use crate::properties::Properties;
use directories_next::BaseDirs;

/// Collect the host properties visible to every build.
///
/// Values that cannot be determined (for example a current directory that is
/// not valid UTF-8) are omitted rather than reported as errors.
#[must_use]
pub fn host_properties() -> Properties {
    let mut props = Properties::new();

    props.set("os.name", std::env::consts::OS);
    props.set("os.arch", std::env::consts::ARCH);
    props.set("os.family", std::env::consts::FAMILY);
    props.set("file.separator", std::path::MAIN_SEPARATOR_STR);
    props.set("path.separator", path_separator());
    props.set("line.separator", line_separator());

    match std::env::current_dir() {
        Ok(dir) => match dir.into_os_string().into_string() {
            Ok(dir) => props.set("user.dir", dir),
            Err(_) => log::trace!("host_properties: current dir is not valid UTF-8"),
        },
        Err(e) => log::trace!("host_properties: failed to get current dir: {e}"),
    }

    if let Some(home) = BaseDirs::new().and_then(|dirs| dirs.home_dir().to_str().map(str::to_owned))
    {
        props.set("user.home", home);
    }

    if let Some(user) = user_name() {
        props.set("user.name", user);
    }

    props
}

fn user_name() -> Option<String> {
    ["USER", "USERNAME"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
}

const fn path_separator() -> &'static str {
    if cfg!(windows) { ";" } else { ":" }
}

const fn line_separator() -> &'static str {
    if cfg!(windows) { "\r\n" } else { "\n" }
}
