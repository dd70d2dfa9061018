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

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use structopt::StructOpt;

use super::admin;
use crate::mail::Storage;
use crate::model::Tier;
use crate::namespace::NamespaceConfig;
use crate::store::ObjectStore;
use crate::support::diagnostic;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Command {
    #[structopt(flatten)]
    common: CommonOptions,

    #[structopt(subcommand)]
    subcommand: Subcommand,
}

#[derive(StructOpt, Default)]
struct CommonOptions {
    /// The directory containing `objbox.toml` etc
    /// [default: /etc/objbox or /usr/local/etc/objbox]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Inspect or initialise the namespace configuration object.
    Config(ConfigSubcommand),
    /// Inspect the user to namespace mapping.
    Namespace(NamespaceSubcommand),
    /// Inspect and relocate individual objects.
    Object(ObjectSubcommand),
}

#[derive(StructOpt)]
enum ConfigSubcommand {
    /// Display the namespace configuration.
    ///
    /// If the store does not have one yet, the defaults are written first.
    Show,
    /// Write a new namespace configuration.
    ///
    /// This fails if the store already has one, since changing the mapping
    /// of existing users would orphan their mail.
    Init(ConfigInitSubcommand),
}

#[derive(StructOpt)]
struct ConfigInitSubcommand {
    /// Give each user a randomly generated namespace instead of deriving it
    /// from their name.
    #[structopt(long)]
    generated_namespace: bool,

    /// The namespace recording generated user namespaces.
    #[structopt(long, default_value = "objbox_ns_cfg")]
    ns_cfg: String,

    /// Appended to user names to form their namespaces.
    #[structopt(long, default_value = "_namespace")]
    ns_suffix: String,

    /// The namespace for shared mailboxes.
    #[structopt(long, default_value = "public")]
    public_namespace: String,
}

#[derive(StructOpt)]
enum NamespaceSubcommand {
    /// Print the namespace holding a user's mail.
    ///
    /// With a generated-namespace configuration, this assigns a namespace to
    /// the user if they don't have one yet.
    Lookup {
        /// The user name.
        user: String,
    },
}

#[derive(StructOpt, Default)]
struct ObjectLocation {
    /// Operate within this namespace instead of the default one.
    #[structopt(short, long)]
    namespace: Option<String>,
}

#[derive(StructOpt)]
enum ObjectSubcommand {
    /// List the objects in a namespace.
    Ls {
        #[structopt(flatten)]
        location: ObjectLocation,
        /// List the alternate tier instead of the primary one.
        #[structopt(long)]
        alt: bool,
    },
    /// Show the size, attributes and counters of an object.
    Stat {
        #[structopt(flatten)]
        location: ObjectLocation,
        /// Look in the alternate tier instead of the primary one.
        #[structopt(long)]
        alt: bool,
        /// The object name.
        name: String,
    },
    /// Move an object from primary to alternate storage.
    ///
    /// The source is only removed once the copy has been verified. If the
    /// source cannot be removed afterwards, both copies are left in place and
    /// the command fails.
    ///
    /// Note that this does not update any mailbox index referring to the
    /// object.
    Migrate {
        #[structopt(flatten)]
        location: ObjectLocation,
        /// Move from alternate to primary storage instead.
        #[structopt(long)]
        inverse: bool,
        /// The object name.
        name: String,
    },
    /// Copy an object from primary to alternate storage.
    Copy {
        #[structopt(flatten)]
        location: ObjectLocation,
        /// Copy from alternate to primary storage instead.
        #[structopt(long)]
        inverse: bool,
        /// The object name.
        name: String,
        /// The name of the copy [default: same as the source]
        dest: Option<String>,
    },
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let root = cmd.common.root.unwrap_or_else(|| {
        if Path::new("/etc/objbox/objbox.toml").is_file() {
            "/etc/objbox".to_owned().into()
        } else if Path::new("/usr/local/etc/objbox/objbox.toml").is_file() {
            "/usr/local/etc/objbox".to_owned().into()
        } else {
            die!(
                EX_CONFIG,
                "Neither /etc/objbox nor /usr/local/etc/objbox looks like\n\
                 the Objbox root; use --root=/path/to/objbox if your\n\
                 installation is elsewhere."
            )
        }
    });

    let system_config_path = root.join("objbox.toml");
    let mut system_config_toml = Vec::new();
    if let Err(e) = fs::File::open(&system_config_path)
        .and_then(|mut f| f.read_to_end(&mut system_config_toml))
    {
        die!(
            EX_CONFIG,
            "Error reading '{}': {}",
            system_config_path.display(),
            e
        );
    }

    let system_config: SystemConfig =
        match toml::from_slice(&system_config_toml) {
            Ok(config) => config,
            Err(e) => die!(
                EX_CONFIG,
                "Error in config file at '{}': {}",
                system_config_path.display(),
                e
            ),
        };

    if let Err(exit) =
        diagnostic::apply_diagnostics(&root, &system_config.diagnostic)
    {
        exit.exit();
    }

    init_logging(&root);

    let storage = match Storage::from_config(
        LogPrefix::new("objbox".to_owned()),
        &system_config,
        &root,
    ) {
        Ok(storage) => storage,
        Err(e) => die!(Sysexit::from(&e), "Unable to open storage: {}", e),
    };

    if let Err(e) = run(&storage, cmd.subcommand) {
        die!(Sysexit::from(&e), "{}", e);
    }
}

fn init_logging(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    // Right now we have this awkward situation where you can use log4rs *or*
    // syslog, because log4rs-syslog hasn't been updated in quite a while.
    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        let logger = match syslog::unix(formatter) {
            Ok(logger) => logger,
            Err(e) => {
                die!(EX_UNAVAILABLE, "Failed to connect to syslog: {}", e)
            }
        };
        if let Err(e) =
            log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                .map(|_| log::set_max_level(log::LevelFilter::Info))
        {
            die!(EX_SOFTWARE, "Failed to initialise logging: {}", e);
        }
    }
}

fn run(storage: &Storage, subcommand: Subcommand) -> Result<(), Error> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match subcommand {
        Subcommand::Config(ConfigSubcommand::Show) => {
            admin::config_show(&*storage.primary, &mut out)
        }
        Subcommand::Config(ConfigSubcommand::Init(cmd)) => admin::config_init(
            &*storage.primary,
            NamespaceConfig {
                generated_namespace: cmd.generated_namespace,
                ns_cfg: cmd.ns_cfg,
                ns_suffix: cmd.ns_suffix,
                public_namespace: cmd.public_namespace,
                valid: true,
            },
            &mut out,
        ),
        Subcommand::Namespace(NamespaceSubcommand::Lookup { user }) => {
            admin::namespace_lookup(storage, &user, &mut out)
        }
        Subcommand::Object(ObjectSubcommand::Ls { location, alt }) => {
            let store = locate(storage, &location, alt)?;
            admin::object_ls(&*store, &mut out)
        }
        Subcommand::Object(ObjectSubcommand::Stat {
            location,
            alt,
            name,
        }) => {
            let store = locate(storage, &location, alt)?;
            admin::object_stat(&*store, &name, &mut out)
        }
        Subcommand::Object(ObjectSubcommand::Migrate {
            location,
            inverse,
            name,
        }) => {
            let storage = in_namespace(storage, &location)?;
            admin::object_migrate(&storage, &name, inverse, &mut out)
        }
        Subcommand::Object(ObjectSubcommand::Copy {
            location,
            inverse,
            name,
            dest,
        }) => {
            let storage = in_namespace(storage, &location)?;
            let dest = dest.unwrap_or_else(|| name.clone());
            admin::object_copy(&storage, &name, &dest, inverse, &mut out)
        }
    }
}

fn in_namespace(
    storage: &Storage,
    location: &ObjectLocation,
) -> Result<Storage, Error> {
    match location.namespace {
        Some(ref ns) => storage.in_namespace(ns),
        None => storage.in_namespace(storage.primary.namespace()),
    }
}

fn locate(
    storage: &Storage,
    location: &ObjectLocation,
    alt: bool,
) -> Result<Rc<dyn ObjectStore>, Error> {
    let storage = in_namespace(storage, location)?;
    storage.tier(if alt { Tier::Alternate } else { Tier::Primary })
}
