//! Extension pour intégrer l'enregistreur dans pmoconfig
//!
//! Ce module fournit le trait `RecorderConfigExt` qui ajoute à
//! `pmoconfig::Config` la lecture des réglages de l'enregistreur, de la
//! station et de sa grille de programmes.
//!
//! # Exemple
//!
//! ```no_run
//! use pmoconfig::Config;
//! use pmorecorder::RecorderConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load_config("")?;
//!
//! let station = config.get_station()?;
//! let schedule = config.get_schedule()?;
//! println!("{}: {} shows", station.name, schedule.len());
//! # Ok(())
//! # }
//! ```

use crate::constants::{BUFFER_HEADROOM, DAYS_TO_KEEP, MAX_RESTARTS, TICK_INTERVAL};
use crate::restart::RestartPolicy;
use crate::scheduler::SchedulerSettings;
use crate::station::Station;
use anyhow::{Context, Result};
use pmoconfig::Config;
use pmoschedule::Schedule;
use pmostream::{constants as stream, BufferPolicy, EngineSettings};
use serde_yaml::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Default recordings directory, relative to the config directory
pub const DEFAULT_SAVE_FOLDER: &str = "recordings";

/// Default output backend
pub const DEFAULT_OUTPUT: &str = "cpal";

/// Trait d'extension pour gérer la configuration de l'enregistreur
///
/// # Auto-persist des valeurs par défaut
///
/// Les getters persistent automatiquement les valeurs par défaut dans la
/// configuration si elles n'existent pas encore.
pub trait RecorderConfigExt {
    // ========================================================================
    // Recorder
    // ========================================================================

    /// Répertoire racine des enregistrements (créé si nécessaire)
    fn get_save_folder(&self) -> Result<PathBuf>;
    fn set_save_folder(&self, folder: String) -> Result<()>;

    /// `false` : les émissions sont écoutées mais pas enregistrées
    fn get_record_on(&self) -> Result<bool>;
    fn set_record_on(&self, on: bool) -> Result<()>;

    fn get_auto_restart(&self) -> Result<bool>;
    fn set_auto_restart(&self, on: bool) -> Result<()>;

    fn get_max_restarts(&self) -> Result<u32>;

    /// Durée de rétention en jours (0 désactive le nettoyage)
    fn get_days_to_keep(&self) -> Result<u32>;
    fn set_days_to_keep(&self, days: u32) -> Result<()>;

    fn get_tick_interval(&self) -> Result<Duration>;

    /// Sortie audio de monitoring : `cpal` ou `null`
    fn get_output_backend(&self) -> Result<String>;

    fn get_engine_settings(&self) -> Result<EngineSettings>;

    fn get_scheduler_settings(&self) -> Result<SchedulerSettings>;

    // ========================================================================
    // Station
    // ========================================================================

    fn get_station(&self) -> Result<Station>;

    /// Grille des émissions, triée par heure de début
    fn get_schedule(&self) -> Result<Schedule>;

    /// URLs du flux, par ordre de priorité
    fn get_source_urls(&self) -> Result<Vec<String>>;
}

/// Seconds from the configuration, bounded to a day. NaN falls back to `default`.
fn secs(value: f64, default: Duration) -> Duration {
    if value.is_nan() {
        tracing::warn!("Invalid duration in configuration, using {:?}", default);
        return default;
    }
    Duration::from_secs_f64(value.clamp(0.0, 86_400.0))
}

/// Makes the buffer thresholds reachable.
///
/// The fetch stops filling a quarter second before capacity, so a capacity
/// not above the resume threshold would keep the engine buffering forever.
fn reconcile_buffer(mut settings: EngineSettings) -> EngineSettings {
    let policy = &mut settings.policy;
    if policy.rebuffer_below > policy.resume_above {
        tracing::warn!(
            "Pause threshold {:?} above resume threshold {:?}, lowering it",
            policy.rebuffer_below,
            policy.resume_above
        );
        policy.rebuffer_below = policy.resume_above;
    }
    let minimum = policy.resume_above + BUFFER_HEADROOM;
    if settings.buffer_capacity < minimum {
        tracing::warn!(
            "Buffer capacity {:?} cannot reach the resume threshold, raising it to {:?}",
            settings.buffer_capacity,
            minimum
        );
        settings.buffer_capacity = minimum;
    }
    settings
}

impl RecorderConfigExt for Config {
    fn get_save_folder(&self) -> Result<PathBuf> {
        let dir = self.get_managed_dir(&["recorder", "save_folder"], DEFAULT_SAVE_FOLDER)?;
        Ok(PathBuf::from(dir))
    }

    fn set_save_folder(&self, folder: String) -> Result<()> {
        self.set_managed_dir(&["recorder", "save_folder"], folder)
    }

    fn get_record_on(&self) -> Result<bool> {
        self.get_bool_or(&["recorder", "record_on"], true)
    }

    fn set_record_on(&self, on: bool) -> Result<()> {
        self.set_value(&["recorder", "record_on"], Value::Bool(on))
    }

    fn get_auto_restart(&self) -> Result<bool> {
        self.get_bool_or(&["recorder", "auto_restart"], true)
    }

    fn set_auto_restart(&self, on: bool) -> Result<()> {
        self.set_value(&["recorder", "auto_restart"], Value::Bool(on))
    }

    fn get_max_restarts(&self) -> Result<u32> {
        let value = self.get_u64_or(&["recorder", "max_restarts"], u64::from(MAX_RESTARTS))?;
        Ok(u32::try_from(value).unwrap_or(u32::MAX))
    }

    fn get_days_to_keep(&self) -> Result<u32> {
        let value = self.get_u64_or(&["recorder", "days_to_keep"], u64::from(DAYS_TO_KEEP))?;
        Ok(u32::try_from(value).unwrap_or(u32::MAX))
    }

    fn set_days_to_keep(&self, days: u32) -> Result<()> {
        self.set_value(&["recorder", "days_to_keep"], Value::Number(days.into()))
    }

    fn get_tick_interval(&self) -> Result<Duration> {
        let ms = self.get_u64_or(
            &["recorder", "tick_interval_ms"],
            TICK_INTERVAL.as_millis() as u64,
        )?;
        Ok(Duration::from_millis(ms.max(1)))
    }

    fn get_output_backend(&self) -> Result<String> {
        Ok(self
            .get_string_or(&["recorder", "output"], DEFAULT_OUTPUT)?
            .to_lowercase())
    }

    fn get_engine_settings(&self) -> Result<EngineSettings> {
        let buffer = ["recorder", "buffer"];
        let key = |name: &'static str| [buffer[0], buffer[1], name];

        let duration = |name: &'static str, default: Duration| -> Result<Duration> {
            Ok(secs(self.get_f64_or(&key(name), default.as_secs_f64())?, default))
        };

        let settings = EngineSettings {
            buffer_capacity: duration("capacity_secs", stream::BUFFER_CAPACITY)?,
            policy: BufferPolicy {
                resume_above: duration("resume_threshold_secs", stream::RESUME_THRESHOLD)?,
                rebuffer_below: duration("pause_threshold_secs", stream::REBUFFER_THRESHOLD)?,
            },
            throttle: Duration::from_millis(self.get_u64_or(
                &key("throttle_ms"),
                stream::THROTTLE_DELAY.as_millis() as u64,
            )?),
            monitor_interval: Duration::from_millis(
                self.get_u64_or(
                    &key("monitor_interval_ms"),
                    stream::MONITOR_INTERVAL.as_millis() as u64,
                )?
                .max(1),
            ),
            stop_timeout: Duration::from_millis(self.get_u64_or(
                &["recorder", "stop_timeout_ms"],
                stream::STOP_TIMEOUT.as_millis() as u64,
            )?),
            mute_while_recording: self.get_bool_or(&["recorder", "mute_while_recording"], true)?,
        };
        Ok(reconcile_buffer(settings))
    }

    fn get_scheduler_settings(&self) -> Result<SchedulerSettings> {
        let station = self.get_station()?;
        let restart = RestartPolicy {
            enabled: self.get_auto_restart()?,
            max_restarts: self.get_max_restarts()?,
            ..RestartPolicy::default()
        };
        Ok(SchedulerSettings {
            save_folder: self.get_save_folder()?,
            call_sign: station.directory_name().to_string(),
            record_on: self.get_record_on()?,
            restart,
            tick_interval: self.get_tick_interval()?,
            days_to_keep: self.get_days_to_keep()?,
        })
    }

    fn get_station(&self) -> Result<Station> {
        self.get_section(&["station"])
    }

    fn get_schedule(&self) -> Result<Schedule> {
        let station = self.get_station()?;
        station.schedule().context("Invalid show list")
    }

    fn get_source_urls(&self) -> Result<Vec<String>> {
        let station = self.get_station()?;
        station
            .source_urls(std::path::Path::new(self.get_config_dir()))
            .context("No stream URL configured")
    }
}
