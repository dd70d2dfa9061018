//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Objbox.
//
// Objbox is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Objbox is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Objbox. If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The system-wide configuration for Objbox.
///
/// This is stored in a file named `objbox.toml` under the Objbox system root,
/// which is typically `/usr/local/etc/objbox` or `/etc/objbox`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Where the object stores live.
    pub storage: StorageConfig,

    /// Options controlling what is stored on each mail object.
    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub diagnostic: DiagnosticConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    /// Root of the primary object store. Relative paths are resolved against
    /// the system root.
    pub primary: PathBuf,
    /// Root of the alternate (archive) object store, if any.
    #[serde(default)]
    pub alternate: Option<PathBuf>,
    /// Root of the store holding externalised attachment parts, if any.
    #[serde(default)]
    pub attachments: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpungePolicy {
    /// Expunged messages are removed from whichever tier holds them.
    Delete,
    /// Expunged messages still in primary storage are first moved to the
    /// alternate tier, which is expected to have its own retention.
    Archive,
}

impl Default for ExpungePolicy {
    fn default() -> Self {
        ExpungePolicy::Delete
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MailConfig {
    /// Selector string choosing which optional per-mail attributes are
    /// persisted on the object, one letter per attribute.
    ///
    /// If unset, the built-in default set is used.
    pub attributes: Option<String>,

    /// How expunged messages are disposed of during sync.
    pub expunge_policy: ExpungePolicy,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticConfig {
    /// If set, redirect standard error to this file on startup.
    ///
    /// This is useful for capturing panics when running under a supervisor
    /// that discards standard error.
    pub stderr: Option<PathBuf>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_minimal_and_full() {
        let minimal: SystemConfig = toml::from_str(
            r#"
[storage]
primary = "primary"
"#,
        )
        .unwrap();
        assert_eq!(PathBuf::from("primary"), minimal.storage.primary);
        assert!(minimal.storage.alternate.is_none());
        assert!(minimal.mail.attributes.is_none());
        assert_eq!(ExpungePolicy::Delete, minimal.mail.expunge_policy);

        let full: SystemConfig = toml::from_str(
            r#"
[storage]
primary = "/srv/objbox/primary"
alternate = "/srv/objbox/alt"
attachments = "/srv/objbox/att"

[mail]
attributes = "MGPB"
expunge_policy = "archive"

[diagnostic]
stderr = "/var/log/objbox.err"
"#,
        )
        .unwrap();
        assert_eq!(Some("MGPB"), full.mail.attributes.as_deref());
        assert_eq!(ExpungePolicy::Archive, full.mail.expunge_policy);
        assert!(full.diagnostic.stderr.is_some());
    }
}
