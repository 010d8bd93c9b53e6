use stack_string::{StackString, format_sstr};
use std::{
    env::var,
    fs,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{errors::ElsaLibError, resolver::Resolver};

#[derive(Default, Debug)]
pub struct ConfigInner {
    pub elsa_endpoint_authority: StackString,
    pub cache_location: StackString,
    pub resolvers_path: Option<PathBuf>,
    pub cors_allow_origin: StackString,
    pub cors_max_age: u32,
    pub presign_expiry: u64,
    pub service_id: StackString,
    pub service_name: StackString,
    pub resolvers: Vec<Resolver>,
}

macro_rules! set_config_ok {
    ($s:ident, $id:ident) => {
        $s.$id = var(&stringify!($id).to_uppercase()).ok().map(Into::into);
    };
}

macro_rules! set_config_parse {
    ($s:ident, $id:ident, $d:expr) => {
        $s.$id = var(&stringify!($id).to_uppercase())
            .ok()
            .and_then(|x| x.parse().ok())
            .unwrap_or_else(|| $d);
    };
}

macro_rules! set_config_must {
    ($s:ident, $id:ident) => {
        $s.$id = var(&stringify!($id).to_uppercase())
            .map(Into::into)
            .map_err(|e| {
                ElsaLibError::CustomError(format_sstr!(
                    "{} must be set: {e}",
                    stringify!($id).to_uppercase()
                ))
            })?;
    };
}

macro_rules! set_config_default {
    ($s:ident, $id:ident, $d:expr) => {
        $s.$id = var(&stringify!($id).to_uppercase()).map_or_else(|_| $d, Into::into);
    };
}

#[derive(Default, Debug, Clone)]
pub struct Config(Arc<ConfigInner>);

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_inner(inner: ConfigInner) -> Self {
        Self(Arc::new(inner))
    }

    /// Read configuration from the environment, after loading `env_file` (or
    /// `config.env` in the working directory, or the user config directory).
    ///
    /// # Errors
    /// Returns error if a required variable is missing or the resolvers file is invalid
    pub fn init_config(env_file: Option<&Path>) -> Result<Self, ElsaLibError> {
        let fname = Path::new("config.env");
        let default_fname = dirs::config_dir()
            .map(|config_dir| config_dir.join("htsget_elsa_rust").join("config.env"));

        dotenv::dotenv().ok();

        let env_file = env_file.map(Path::to_path_buf).or_else(|| {
            if fname.exists() {
                Some(fname.to_path_buf())
            } else {
                default_fname
            }
        });

        if let Some(env_file) = env_file.filter(|f| f.exists()) {
            dotenv::from_path(&env_file).ok();
        }

        Self::from_env()
    }

    /// # Errors
    /// Returns error if a required variable is missing or the resolvers file is invalid
    pub fn from_env() -> Result<Self, ElsaLibError> {
        let mut conf = ConfigInner::default();

        set_config_must!(conf, elsa_endpoint_authority);
        set_config_must!(conf, cache_location);

        set_config_ok!(conf, resolvers_path);
        set_config_default!(conf, cors_allow_origin, "*".into());
        set_config_parse!(conf, cors_max_age, 2_592_000);
        set_config_parse!(conf, presign_expiry, 3600);
        set_config_default!(conf, service_id, "htsget-elsa-lambda".into());
        set_config_default!(conf, service_name, "htsget-elsa".into());

        if let Some(resolvers_path) = &conf.resolvers_path {
            conf.resolvers = load_resolvers(resolvers_path)?;
        }

        Ok(Self(Arc::new(conf)))
    }

    #[must_use]
    pub fn presign_duration(&self) -> Duration {
        Duration::from_secs(self.presign_expiry)
    }
}

/// # Errors
/// Returns error if the file cannot be read or does not hold a json list of resolvers
pub fn load_resolvers(path: &Path) -> Result<Vec<Resolver>, ElsaLibError> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(Into::into)
}
