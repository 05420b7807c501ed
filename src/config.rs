use postgres::{Client, NoTls};
use std::{env, error::Error};

/// KoboToolbox account used to pull the survey export.
#[derive(Debug)]
pub struct KoboAuth {
    pub username: String,
    pub password: String,
}

/// Destination Postgres instance.
#[derive(Debug)]
pub struct PgConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

impl PgConfig {
    pub fn connect(&self) -> Result<Client, Box<dyn Error>> {
        let client = postgres::Config::new()
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database)
            .connect(NoTls)?;
        Ok(client)
    }
}

/// Everything the job needs from the environment, read and validated once at
/// startup.  Nothing reads `env::var` after this.
#[derive(Debug)]
pub struct JobConfig {
    pub kobo: KoboAuth,
    pub pg: PgConfig,
}

impl JobConfig {
    pub fn from_env() -> Result<JobConfig, Box<dyn Error>> {
        let port = var("PG_PORT")?;
        Ok(JobConfig {
            kobo: KoboAuth {
                username: var("KOBO_USERNAME")?,
                password: var("KOBO_PASSWORD")?,
            },
            pg: PgConfig {
                host: var("PG_HOST")?,
                database: var("PG_DATABASE")?,
                user: var("PG_USER")?,
                password: var("PG_PASSWORD")?,
                port: port
                    .parse::<u16>()
                    .map_err(|_| format!("PG_PORT is not a valid port: {}", port))?,
            },
        })
    }
}

fn var(name: &str) -> Result<String, Box<dyn Error>> {
    env::var(name).map_err(|_| format!("missing environment variable {}", name).into())
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::error::Error;

    use super::*;

    #[test]
    fn from_env() -> Result<(), Box<dyn Error>> {
        for (name, value) in [
            ("KOBO_USERNAME", "kobo_user"),
            ("KOBO_PASSWORD", "kobo_pass"),
            ("PG_HOST", "localhost"),
            ("PG_DATABASE", "surveys"),
            ("PG_USER", "pg_user"),
            ("PG_PASSWORD", "pg_pass"),
            ("PG_PORT", "5432"),
        ] {
            env::set_var(name, value);
        }
        let config = JobConfig::from_env()?;
        assert_eq!(config.kobo.username, "kobo_user");
        assert_eq!(config.pg.port, 5432);

        env::set_var("PG_PORT", "not-a-port");
        let err = JobConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("PG_PORT"));

        env::remove_var("PG_HOST");
        env::set_var("PG_PORT", "5432");
        let err = JobConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("PG_HOST"));
        Ok(())
    }
}
