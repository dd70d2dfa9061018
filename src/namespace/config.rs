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

//! The per-store namespace configuration document.
//!
//! This is a small JSON object stored as a single object in the store's
//! unnamed namespace. It decides how users are mapped onto namespaces.

use std::fmt::Write as _;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::store::{self, ObjectStore};
use crate::support::error::Error;

/// The name of the object holding the configuration document.
pub const CFG_OBJECT_NAME: &str = "objbox_cfg";

const KEY_GENERATED_NAMESPACE: &str = "generated_namespace";
const KEY_NS_CFG: &str = "ns_cfg";
const KEY_NS_SUFFIX: &str = "ns_suffix";
const KEY_PUBLIC_NAMESPACE: &str = "public_namespace";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// If true, each user gets a randomly generated namespace, recorded in
    /// the `ns_cfg` namespace. Otherwise, a user's namespace is their name
    /// followed by `ns_suffix`.
    pub generated_namespace: bool,
    pub ns_cfg: String,
    pub ns_suffix: String,
    /// The namespace holding shared mailboxes.
    pub public_namespace: String,
    /// Whether this configuration came from a successfully parsed document.
    pub valid: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        NamespaceConfig {
            generated_namespace: false,
            ns_cfg: "objbox_ns_cfg".to_owned(),
            ns_suffix: "_namespace".to_owned(),
            public_namespace: "public".to_owned(),
            valid: false,
        }
    }
}

/// The document as it appears on the wire. Every field is required, and the
/// boolean is carried as the text `true` or `false`.
#[derive(Serialize, Deserialize)]
struct Document {
    generated_namespace: String,
    ns_cfg: String,
    ns_suffix: String,
    public_namespace: String,
}

impl NamespaceConfig {
    /// Parse a configuration document.
    ///
    /// The result is always `valid`.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let doc: Document = serde_json::from_slice(data)?;
        let generated_namespace = match &doc.generated_namespace[..] {
            "true" => true,
            "false" => false,
            _ => return Err(Error::BadConfig),
        };

        Ok(NamespaceConfig {
            generated_namespace,
            ns_cfg: doc.ns_cfg,
            ns_suffix: doc.ns_suffix,
            public_namespace: doc.public_namespace,
            valid: true,
        })
    }

    /// Replace this configuration with the one parsed from `data`.
    ///
    /// If `data` is not a complete, well-formed document, no field other
    /// than `valid` changes, `valid` becomes false, and false is returned.
    pub fn update_from(&mut self, data: &[u8]) -> bool {
        match NamespaceConfig::parse(data) {
            Ok(parsed) => {
                *self = parsed;
                true
            }
            Err(_) => {
                self.valid = false;
                false
            }
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let doc = Document {
            generated_namespace: self.generated_namespace.to_string(),
            ns_cfg: self.ns_cfg.clone(),
            ns_suffix: self.ns_suffix.clone(),
            public_namespace: self.public_namespace.clone(),
        };
        Ok(serde_json::to_vec(&doc)?)
    }

    /// Render the configuration for humans.
    pub fn describe(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "Configuration : {}", CFG_OBJECT_NAME);
        let _ = writeln!(
            s,
            "  {}={}",
            KEY_GENERATED_NAMESPACE, self.generated_namespace
        );
        let _ = writeln!(s, "  {}={}", KEY_NS_CFG, self.ns_cfg);
        let _ = writeln!(s, "  {}={}", KEY_NS_SUFFIX, self.ns_suffix);
        let _ =
            writeln!(s, "  {}={}", KEY_PUBLIC_NAMESPACE, self.public_namespace);
        s
    }

    /// Load the configuration object from `store`.
    ///
    /// If there is no configuration object yet, `self`'s current values are
    /// written as the new one. If there is one but it cannot be parsed, an
    /// error is returned and `self` is left invalid.
    pub fn load(&mut self, store: &dyn ObjectStore) -> Result<(), Error> {
        loop {
            match store::read_all(store, CFG_OBJECT_NAME) {
                Ok(data) => {
                    return if self.update_from(&data) {
                        Ok(())
                    } else {
                        warn!(
                            "{}: {} is not a valid namespace configuration",
                            store.name(),
                            CFG_OBJECT_NAME
                        );
                        Err(Error::BadConfig)
                    };
                }

                Err(Error::NxObject) => (),
                Err(e) => return Err(e),
            }

            match self.store(store) {
                Ok(()) => {
                    self.valid = true;
                    return Ok(());
                }
                // Someone else initialised it first; go read theirs
                Err(Error::ObjectExists) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Write this configuration as the store's configuration object.
    ///
    /// Fails with `ObjectExists` if there already is one.
    pub fn store(&self, store: &dyn ObjectStore) -> Result<(), Error> {
        let data = self.serialize()?;
        store.create(
            CFG_OBJECT_NAME,
            &mut &data[..],
            &Default::default(),
        )?;
        info!(
            "{}: created namespace configuration {}",
            store.name(),
            CFG_OBJECT_NAME
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn defaults_are_invalid() {
        assert!(!NamespaceConfig::default().valid);
    }

    #[test]
    fn parse_complete_document() {
        let config = NamespaceConfig::parse(
            br#"{"generated_namespace":"true","ns_cfg":"cfg",
                 "ns_suffix":"_ns","public_namespace":"pub"}"#,
        )
        .unwrap();
        assert_eq!(
            NamespaceConfig {
                generated_namespace: true,
                ns_cfg: "cfg".to_owned(),
                ns_suffix: "_ns".to_owned(),
                public_namespace: "pub".to_owned(),
                valid: true,
            },
            config
        );
    }

    #[test]
    fn any_missing_key_invalidates() {
        let full: serde_json::Value = serde_json::from_slice(
            &NamespaceConfig::default().serialize().unwrap(),
        )
        .unwrap();

        for key in &[
            KEY_GENERATED_NAMESPACE,
            KEY_NS_CFG,
            KEY_NS_SUFFIX,
            KEY_PUBLIC_NAMESPACE,
        ] {
            let mut doc = full.clone();
            doc.as_object_mut().unwrap().remove(*key);
            let data = serde_json::to_vec(&doc).unwrap();

            let mut config = NamespaceConfig {
                ns_suffix: "_keep".to_owned(),
                valid: true,
                ..NamespaceConfig::default()
            };
            assert!(!config.update_from(&data), "key {}", key);
            assert!(!config.valid);
            assert_eq!("_keep", config.ns_suffix);
        }
    }

    #[test]
    fn malformed_documents_invalidate() {
        let mut config = NamespaceConfig::default();
        assert!(!config.update_from(b"{"));
        assert!(!config.update_from(b""));
        assert!(!config.update_from(
            br#"{"generated_namespace":"yes","ns_cfg":"a",
                 "ns_suffix":"b","public_namespace":"c"}"#
        ));
        assert!(!config.update_from(
            br#"{"generated_namespace":true,"ns_cfg":"a",
                 "ns_suffix":"b","public_namespace":"c"}"#
        ));
        assert_eq!(NamespaceConfig::default(), config);
    }

    #[test]
    fn describe_lists_every_key() {
        let text = NamespaceConfig::default().describe();
        assert!(text.starts_with("Configuration : objbox_cfg\n"));
        assert!(text.contains("  generated_namespace=false\n"));
        assert!(text.contains("  ns_cfg=objbox_ns_cfg\n"));
        assert!(text.contains("  ns_suffix=_namespace\n"));
        assert!(text.contains("  public_namespace=public\n"));
    }

    #[test]
    fn load_initialises_missing_config() {
        let store = MemoryStore::new("mem");
        let mut config = NamespaceConfig {
            generated_namespace: true,
            ..NamespaceConfig::default()
        };
        config.load(&store).unwrap();
        assert!(config.valid);

        let mut reloaded = NamespaceConfig::default();
        reloaded.load(&store).unwrap();
        assert_eq!(config, reloaded);
    }

    #[test]
    fn load_rejects_garbage() {
        let store = MemoryStore::new("mem");
        store
            .create(CFG_OBJECT_NAME, &mut &b"nope"[..], &Default::default())
            .unwrap();
        let mut config = NamespaceConfig::default();
        assert_matches!(Err(Error::BadConfig), config.load(&store));
        assert!(!config.valid);
    }

    proptest! {
        #[test]
        fn config_round_trip(
            generated_namespace in any::<bool>(),
            ns_cfg in ".*",
            ns_suffix in ".*",
            public_namespace in ".*",
        ) {
            let config = NamespaceConfig {
                generated_namespace,
                ns_cfg,
                ns_suffix,
                public_namespace,
                valid: true,
            };
            let parsed =
                NamespaceConfig::parse(&config.serialize().unwrap()).unwrap();
            prop_assert_eq!(config, parsed);
        }
    }
}
