use log::Level;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[doc(hidden)]
#[macro_export(local_inner_macros)]
macro_rules! impl_from_env {
    ($type: tt) => {
        impl<'a> Into<$type> for EnvVarDefault<'a, $type> {
            #[inline]
            fn into(self) -> $type {
                if let Ok(v) = std::env::var(&self.name) {
                    match $type::from_str(&v) {
                        Ok(r) => return r,
                        Err(_) => {
                            std::eprintln!(
                                "env {}={} is not valid, set to {:?}",
                                self.name,
                                v,
                                self.default
                            );
                        }
                    }
                }
                return self.default;
            }
        }
    };
}

pub struct EnvVarDefault<'a, T> {
    pub(crate) name: &'a str,
    pub(crate) default: T,
}

/// To config some logger setting with env.
///
/// Read value from environment, and set with default if not exists.
///
/// NOTE: the arguments to load from env_or() must support owned values.
///
/// Example (crate-internal: `env_or` backs [`crate::config::EngineConfig`]'s
/// defaults and isn't part of the public API, hence `ignore` below):
///
/// ```rust,ignore
/// use log::Level;
/// use crate::env::env_or;
///
/// let _level: Level = env_or("LOG_LEVEL", Level::Info).into();
/// let _file_path: String = env_or("LOG_FILE", "/tmp/test.log").into();
/// ```
pub fn env_or<'a, T>(name: &'a str, default: T) -> EnvVarDefault<'a, T> {
    EnvVarDefault { name, default }
}

impl<'a> Into<String> for EnvVarDefault<'a, &'a str> {
    fn into(self) -> String {
        if let Ok(v) = std::env::var(&self.name) {
            return v;
        }
        return self.default.to_string();
    }
}

impl<'a, P: AsRef<Path>> Into<PathBuf> for EnvVarDefault<'a, P> {
    fn into(self) -> PathBuf {
        if let Some(v) = std::env::var_os(&self.name) {
            if v.len() > 0 {
                return PathBuf::from(v);
            }
        }
        return self.default.as_ref().to_path_buf();
    }
}

crate::impl_from_env!(Level);
crate::impl_from_env!(usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_level() {
        unsafe { std::env::set_var("OMNILOG_TEST_LEVEL", "warn") };
        let level: Level = env_or("OMNILOG_TEST_LEVEL", Level::Debug).into();
        assert_eq!(level, Level::Warn);
        unsafe { std::env::set_var("OMNILOG_TEST_LEVEL", "WARN") };
        let level: Level = env_or("OMNILOG_TEST_LEVEL", Level::Debug).into();
        assert_eq!(level, Level::Warn);
        unsafe { std::env::remove_var("OMNILOG_TEST_LEVEL") };
    }

    #[test]
    fn test_env_usize() {
        unsafe { std::env::set_var("OMNILOG_TEST_SIZE", "256") };
        let size: usize = env_or("OMNILOG_TEST_SIZE", 100usize).into();
        assert_eq!(size, 256);
        unsafe { std::env::set_var("OMNILOG_TEST_SIZE", "not-a-number") };
        let size: usize = env_or("OMNILOG_TEST_SIZE", 100usize).into();
        assert_eq!(size, 100);
        unsafe { std::env::remove_var("OMNILOG_TEST_SIZE") };
    }

    #[test]
    fn test_env_path() {
        unsafe { std::env::set_var("OMNILOG_TEST_PATH", "/tmp/test.log") };
        let path: PathBuf = env_or("OMNILOG_TEST_PATH", "/tmp/other.log").into();
        assert_eq!(path, Path::new("/tmp/test.log").to_path_buf());

        unsafe { std::env::set_var("OMNILOG_TEST_PATH", "") };
        let path: PathBuf = env_or("OMNILOG_TEST_PATH", "/tmp/other.log").into();
        assert_eq!(path, Path::new("/tmp/other.log").to_path_buf());
        unsafe { std::env::remove_var("OMNILOG_TEST_PATH") };
    }
}
