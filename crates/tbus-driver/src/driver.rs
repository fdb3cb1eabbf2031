//! Router driver: lifecycle and command dispatch

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tbus_core::codec::encode_command;
use tbus_core::{CrosspointCommand, Level};
use tbus_transport::{TcpTransport, Transport};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::builder::RouterDriverBuilder;
use crate::config::DriverConfig;
use crate::registration::FunctionId;
use crate::session::{SessionManager, SessionState};
use crate::staging::{ControllerId, StagingField, StagingStore};
use crate::status::StatusSink;
use crate::{DriverError, Result};

/// A request from the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a crosspoint immediately
    DirectCrosspoint(CrosspointCommand),
    /// Stage a level for a controller
    StageLevel { controller: ControllerId, level: Level },
    /// Stage a destination for a controller
    StageDestination {
        controller: ControllerId,
        destination: u16,
    },
    /// Stage a source for a controller
    StageSource { controller: ControllerId, source: u16 },
    /// Take the controller's staged selection
    CommitStaged { controller: ControllerId },
}

/// Level as hosts send it: a label, a bitmask value, or a combo-box item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelParam {
    Bits(u32),
    Label(String),
    Item { label: String },
}

impl LevelParam {
    pub fn resolve(&self) -> Result<Level> {
        let level = match self {
            LevelParam::Bits(bits) => Level::from_bits(*bits)
                .ok_or_else(|| tbus_core::Error::UnknownLevel(bits.to_string()))?,
            LevelParam::Label(label) | LevelParam::Item { label } => label.parse::<Level>()?,
        };
        Ok(level)
    }
}

/// Matrix index as hosts send it.
///
/// A bare number is the 1-based router index. A combo-box item carries the
/// 0-based position of the entry in the host's source or destination list,
/// so `{"id": 0}` is index 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexParam {
    Number(u16),
    Item { id: u16 },
}

impl IndexParam {
    /// The 1-based router index
    pub fn resolve(self, field: &'static str) -> Result<u16> {
        match self {
            IndexParam::Number(n) => Ok(n),
            IndexParam::Item { id } => id
                .checked_add(1)
                .ok_or(DriverError::Codec(tbus_core::Error::IndexOutOfRange { field, value: id })),
        }
    }
}

/// Parameters attached to a host action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParams {
    #[serde(default)]
    pub level: Option<LevelParam>,
    #[serde(default)]
    pub dst: Option<IndexParam>,
    #[serde(default)]
    pub src: Option<IndexParam>,
}

impl Command {
    /// Build a command from a host action.
    ///
    /// Multi-stage functions need the controller the action came from.
    pub fn from_action(
        function: FunctionId,
        controller: Option<&str>,
        params: &ActionParams,
    ) -> Result<Self> {
        let controller = || {
            controller
                .map(ControllerId::from)
                .ok_or(DriverError::MissingParameter("controller"))
        };
        let level = || {
            params
                .level
                .as_ref()
                .ok_or(DriverError::MissingParameter("level"))?
                .resolve()
        };
        let destination = || {
            params
                .dst
                .ok_or(DriverError::MissingParameter("dst"))?
                .resolve("destination")
        };
        let source = || {
            params
                .src
                .ok_or(DriverError::MissingParameter("src"))?
                .resolve("source")
        };

        Ok(match function {
            FunctionId::Crosspoint => {
                Command::DirectCrosspoint(CrosspointCommand::new(level()?, destination()?, source()?))
            }
            FunctionId::StageLevel => Command::StageLevel {
                controller: controller()?,
                level: level()?,
            },
            FunctionId::StageDestination => Command::StageDestination {
                controller: controller()?,
                destination: destination()?,
            },
            FunctionId::StageSource => Command::StageSource {
                controller: controller()?,
                source: source()?,
            },
            FunctionId::Take => Command::CommitStaged {
                controller: controller()?,
            },
        })
    }
}

/// What [`RouterDriver::dispatch`] did with a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Frame queued on the live connection
    Sent(CrosspointCommand),
    /// Selection updated, nothing sent
    Staged,
    /// Take refused; the named field was never staged
    Incomplete(StagingField),
    /// No live connection; the command was dropped
    NotConnected(CrosspointCommand),
}

/// Ross NK-IPS router driver
pub struct RouterDriver<T: Transport = TcpTransport> {
    config: DriverConfig,
    session: SessionManager<T>,
    staging: StagingStore,
}

impl RouterDriver<TcpTransport> {
    /// Create a builder for a driver talking to `host`
    pub fn builder(host: &str) -> RouterDriverBuilder {
        RouterDriverBuilder::new(host)
    }
}

impl<T: Transport> RouterDriver<T> {
    /// Create a driver over `transport`; the configuration is validated first
    pub fn new(config: DriverConfig, transport: T, sink: Arc<dyn StatusSink>) -> Result<Self> {
        config.validate()?;

        let session = SessionManager::new(transport, config.session_config(), sink);
        let staging = StagingStore::new(config.staging.clone());

        Ok(Self {
            config,
            session,
            staging,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager<T> {
        &self.session
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Start connecting. Returns immediately; progress is reported through
    /// the status sink.
    pub fn start(&self) -> Result<()> {
        self.session.start()?;
        Ok(())
    }

    /// Shut the driver down for good. Idempotent.
    pub async fn stop(&self) {
        if !self.session.is_stopped() {
            info!(
                device = %self.config.device_id,
                label = %self.config.display_label(),
                "Destroying instance"
            );
        }
        self.session.stop().await;
    }

    /// Tear down and reconnect from scratch
    pub async fn restart(&self) -> Result<()> {
        self.session.restart().await?;
        Ok(())
    }

    /// Execute a host command.
    ///
    /// Transport problems never surface as errors here: a command issued
    /// while disconnected comes back as [`DispatchOutcome::NotConnected`].
    /// Errors are reserved for commands that cannot be encoded.
    pub fn dispatch(&self, command: Command) -> Result<DispatchOutcome> {
        match command {
            Command::DirectCrosspoint(crosspoint) => self.send_crosspoint(crosspoint),
            Command::StageLevel { controller, level } => {
                self.staging.set_level(&controller, level);
                Ok(DispatchOutcome::Staged)
            }
            Command::StageDestination {
                controller,
                destination,
            } => {
                self.staging.set_destination(&controller, destination);
                Ok(DispatchOutcome::Staged)
            }
            Command::StageSource { controller, source } => {
                self.staging.set_source(&controller, source);
                Ok(DispatchOutcome::Staged)
            }
            Command::CommitStaged { controller } => match self.staging.try_commit(&controller) {
                Ok(crosspoint) => self.send_crosspoint(crosspoint),
                Err(incomplete) => {
                    warn!(
                        device = %self.config.device_id,
                        controller = %controller,
                        "Take ignored: {}",
                        incomplete
                    );
                    Ok(DispatchOutcome::Incomplete(incomplete.missing))
                }
            },
        }
    }

    /// Parse a host action and dispatch it
    pub fn dispatch_action(
        &self,
        function: &str,
        controller: Option<&str>,
        params: &ActionParams,
    ) -> Result<DispatchOutcome> {
        let function: FunctionId = function.parse()?;
        self.dispatch(Command::from_action(function, controller, params)?)
    }

    fn send_crosspoint(&self, crosspoint: CrosspointCommand) -> Result<DispatchOutcome> {
        let frame = encode_command(self.config.address, &crosspoint)?;

        match self.session.send(frame) {
            Ok(()) => {
                info!(device = %self.config.device_id, "Crosspoint {}", crosspoint);
                Ok(DispatchOutcome::Sent(crosspoint))
            }
            Err(e) => {
                warn!(
                    device = %self.config.device_id,
                    "Crosspoint {} dropped: {}",
                    crosspoint,
                    e
                );
                Ok(DispatchOutcome::NotConnected(crosspoint))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_action_direct() {
        let params: ActionParams =
            serde_json::from_str(r#"{"level": "SDI Video", "dst": 5, "src": {"id": 9}}"#).unwrap();
        let command = Command::from_action(FunctionId::Crosspoint, None, &params).unwrap();
        assert_eq!(
            command,
            Command::DirectCrosspoint(CrosspointCommand::new(Level::SdiVideo, 5, 10))
        );
    }

    #[test]
    fn test_from_action_level_forms() {
        for json in [
            r#"{"level": 4}"#,
            r#"{"level": "AES Audio 1"}"#,
            r#"{"level": {"label": "AES Audio 1"}}"#,
        ] {
            let params: ActionParams = serde_json::from_str(json).unwrap();
            let command =
                Command::from_action(FunctionId::StageLevel, Some("panel"), &params).unwrap();
            assert_eq!(
                command,
                Command::StageLevel {
                    controller: ControllerId::from("panel"),
                    level: Level::AesAudio1,
                }
            );
        }
    }

    #[test]
    fn test_item_index_is_zero_based() {
        let params: ActionParams =
            serde_json::from_str(r#"{"dst": {"id": 0}, "src": 1}"#).unwrap();

        let command =
            Command::from_action(FunctionId::StageDestination, Some("panel"), &params).unwrap();
        assert_eq!(
            command,
            Command::StageDestination {
                controller: ControllerId::from("panel"),
                destination: 1,
            }
        );

        let command = Command::from_action(FunctionId::StageSource, Some("panel"), &params).unwrap();
        assert_eq!(
            command,
            Command::StageSource {
                controller: ControllerId::from("panel"),
                source: 1,
            }
        );
    }

    #[test]
    fn test_item_index_overflow() {
        let params: ActionParams = serde_json::from_str(r#"{"dst": {"id": 65535}}"#).unwrap();
        let result = Command::from_action(FunctionId::StageDestination, Some("panel"), &params);
        assert!(matches!(
            result,
            Err(DriverError::Codec(tbus_core::Error::IndexOutOfRange { field: "destination", .. }))
        ));
    }

    #[test]
    fn test_from_action_requires_controller() {
        let result = Command::from_action(FunctionId::Take, None, &ActionParams::default());
        assert!(matches!(
            result,
            Err(DriverError::MissingParameter("controller"))
        ));
    }

    #[test]
    fn test_from_action_missing_parameter() {
        let params: ActionParams = serde_json::from_str(r#"{"level": 2, "dst": 1}"#).unwrap();
        let result = Command::from_action(FunctionId::Crosspoint, None, &params);
        assert!(matches!(result, Err(DriverError::MissingParameter("src"))));
    }

    #[test]
    fn test_from_action_unknown_level() {
        let params: ActionParams = serde_json::from_str(r#"{"level": 3}"#).unwrap();
        let result = Command::from_action(FunctionId::StageLevel, Some("panel"), &params);
        assert!(matches!(result, Err(DriverError::Codec(_))));
    }
}
