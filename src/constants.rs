/// Container engine constants
pub mod engine {
    /// Podman executable name
    pub const PODMAN: &str = "podman";

    /// Docker executable name
    pub const DOCKER: &str = "docker";

    /// Engines probed on PATH, in order of preference
    pub const SEARCH_ORDER: [&str; 2] = [PODMAN, DOCKER];

    /// Environment variable selecting the engine explicitly
    pub const ENV_OVERRIDE: &str = "VIRES_CONTAINER_ENGINE";
}

/// Configuration layout constants
pub mod config {
    /// Environment variable pointing at the container root directory
    pub const ROOT_ENV: &str = "VIRES_CONTAINER_ROOT";

    /// Name of the layered TOML descriptor files
    pub const COMMON_FILE: &str = "common.toml";

    /// Optional per-image tag overlay
    pub const TAG_OVERLAY: &str = "tag.conf";

    /// Optional per-image user overlay, applied last
    pub const USER_OVERLAY: &str = "user.conf";

    /// Directory name under the user's config dir
    pub const APP_DIR: &str = "vires";
}

/// Container image tag constants
pub mod tag {
    /// Default container image tag
    pub const DEFAULT: &str = "latest";
}

/// Container defaults
pub mod container {
    /// Shell used by `exec` and `run` when no command is given
    pub const DEFAULT_SHELL: &str = "/bin/bash";

    /// Default `exec` options (interactive terminal)
    pub const DEFAULT_EXEC_OPTIONS: [&str; 1] = ["-it"];
}

/// Pod bring-up defaults
pub mod pod {
    pub const NAME: &str = "vires";
    pub const DATABASE_IMAGE: &str = "database";
    pub const SERVICES: [&str; 4] = ["redis", "oauth", "swarm", "ingress"];
    pub const READY_COMMAND: [&str; 2] = ["pg_isready", "-q"];
    pub const READY_ATTEMPTS: u32 = 30;
    pub const READY_INTERVAL_MS: u64 = 2000;
    pub const BOOTSTRAP_COMMAND: &str = "create_db";
}

/// PostgreSQL bootstrap constants
pub mod database {
    /// Superuser used by `psql`
    pub const SUPERUSER: &str = "postgres";

    /// Marker prefix of managed pg_hba.conf stanzas
    pub const HBA_BEGIN: &str = "# BEGIN vires-deploy";

    /// Marker closing a managed pg_hba.conf stanza
    pub const HBA_END: &str = "# END vires-deploy";

    /// Authentication method granted to the owning role
    pub const HBA_METHOD: &str = "scram-sha-256";

    /// Authentication method kept for the superuser's local socket access
    pub const HBA_SUPERUSER_METHOD: &str = "peer";

    /// Length of generated database passwords
    pub const PASSWORD_LENGTH: usize = 32;
}

/// Secrets bundle keys
pub mod secrets {
    pub const DBNAME: &str = "DBNAME";
    pub const DBUSER: &str = "DBUSER";
    pub const DBPASSWD: &str = "DBPASSWD";
    pub const DBEXTENSIONS: &str = "DBEXTENSIONS";
}

/// Systemd unit naming
pub mod systemd {
    pub const UNIT_PREFIX: &str = "vires-";
    pub const UNIT_SUFFIX: &str = ".service";
}
