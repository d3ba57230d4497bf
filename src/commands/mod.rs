//! Thin adapters mapping a named operation onto `execute(name, version,
//! body) -> Response`. Each one is data (a command name plus a body shape),
//! not a class hierarchy: the status-to-bool and JSON-decode behaviours are
//! expressed as higher-order wrappers around the shared `execute` call
//! rather than inheritance, matching the reference implementation's
//! decorator-based command methods.

use codec::{ProtocolVersion, Response};
use serde::Serialize;
use serde_json::json;
use session::Error;

/// Implemented by anything that can issue a raw RCON request: `Connection`
/// and `Pool` both satisfy this, so [`RconCommands`] is usable against
/// either a single session or a whole pool without duplicating the command
/// bodies.
pub trait RconExecutor: Send + Sync {
    fn execute(
        &self,
        name: &str,
        version: ProtocolVersion,
        body: String,
    ) -> impl std::future::Future<Output = Result<Response, Error>> + Send;
}

impl RconExecutor for crate::connection::Connection {
    async fn execute(
        &self,
        name: &str,
        version: ProtocolVersion,
        body: String,
    ) -> Result<Response, Error> {
        crate::connection::Connection::execute(self, name, version, body).await
    }
}

impl RconExecutor for crate::pool::Pool {
    async fn execute(
        &self,
        name: &str,
        version: ProtocolVersion,
        body: String,
    ) -> Result<Response, Error> {
        crate::pool::Pool::execute(self, name, version, body).await
    }
}

fn compact_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("command body is always serialisable")
}

/// Raises unless the response status is exactly 200, converting a non-200
/// status into a `session::Error::Command`.
fn raise_for_status(response: Response) -> Result<Response, Error> {
    if response.status_code.is_ok() {
        Ok(response)
    } else {
        Err(Error::Command {
            name: response.name.clone(),
            status: response.status_code,
            message: response.status_message.clone(),
        })
    }
}

/// A handful of worked examples of the command-surface contract, not an
/// exhaustive catalog: fetching players, the map rotation/sequence/session/
/// config, banned words, changing the map, and banning/kicking a player.
pub trait RconCommands: RconExecutor {
    /// Kicks a player. Returns `Ok(false)` instead of raising when the
    /// server reports `400` (player not present), matching the reference's
    /// "success-on-status-mismatch" mapping for this one operation; any
    /// other non-200 status still raises.
    async fn kick_player(
        &self,
        player_id: &str,
        message: &str,
        version: ProtocolVersion,
    ) -> Result<bool, Error> {
        let body = match version {
            ProtocolVersion::V2 => {
                compact_json(&json!({"PlayerId": player_id, "Reason": message}))
            }
            ProtocolVersion::V1 => format!("{player_id} {message}"),
        };
        let name = match version {
            ProtocolVersion::V2 => "KickPlayer",
            ProtocolVersion::V1 => "kick",
        };
        match self.execute(name, version, body).await.map(raise_for_status) {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(Error::Command { status, .. })) if status.code() == 400 => Ok(false),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e),
        }
    }

    /// Bans a player. `duration_hours = None` issues a permanent ban.
    async fn ban_player(
        &self,
        player_id: &str,
        reason: &str,
        admin_name: &str,
        duration_hours: Option<u32>,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        let (name, body) = match (version, duration_hours) {
            (ProtocolVersion::V2, Some(hours)) => (
                "TemporaryBanPlayer",
                compact_json(&json!({
                    "PlayerId": player_id,
                    "Duration": hours,
                    "Reason": reason,
                    "AdminName": admin_name,
                })),
            ),
            (ProtocolVersion::V2, None) => (
                "PermanentBanPlayer",
                compact_json(&json!({
                    "PlayerId": player_id,
                    "Reason": reason,
                    "AdminName": admin_name,
                })),
            ),
            (ProtocolVersion::V1, Some(hours)) => {
                ("tempban", format!("{player_id} {hours} {reason} {admin_name}"))
            }
            (ProtocolVersion::V1, None) => {
                ("permaban", format!("{player_id} {reason} {admin_name}"))
            }
        };
        raise_for_status(self.execute(name, version, body).await?).map(|_| ())
    }

    /// Lifts a temporary ban. Returns `Ok(false)` on `400` (no such ban),
    /// mirroring `kick_player`'s mapping.
    async fn remove_temporary_ban(
        &self,
        player_id: &str,
        version: ProtocolVersion,
    ) -> Result<bool, Error> {
        let (name, body) = match version {
            ProtocolVersion::V2 => (
                "RemoveTemporaryBan",
                compact_json(&json!({"PlayerId": player_id})),
            ),
            ProtocolVersion::V1 => ("pardontempban", player_id.to_string()),
        };
        match self.execute(name, version, body).await.map(raise_for_status) {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(Error::Command { status, .. })) if status.code() == 400 => Ok(false),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e),
        }
    }

    /// Changes the current map. v2-only: v1 has no equivalent command here.
    async fn change_map(&self, map_name: &str, version: ProtocolVersion) -> Result<(), Error> {
        match version {
            ProtocolVersion::V2 => {
                raise_for_status(
                    self.execute(
                        "ChangeMap",
                        version,
                        compact_json(&json!({"MapName": map_name})),
                    )
                    .await?,
                )
                .map(|_| ())
            }
            ProtocolVersion::V1 => raise_for_status(
                self.execute("map", version, map_name.to_string()).await?,
            )
            .map(|_| ()),
        }
    }

    /// Raw player list; the shape of `content_body` is opaque to this crate
    /// (see the Non-goals on response payload schemas).
    async fn get_players(&self, version: ProtocolVersion) -> Result<Response, Error> {
        let (name, body) = match version {
            ProtocolVersion::V2 => (
                "GetServerInformation",
                compact_json(&json!({"Name": "players", "Value": ""})),
            ),
            ProtocolVersion::V1 => ("get playerids", String::new()),
        };
        raise_for_status(self.execute(name, version, body).await?)
    }

    async fn get_map_rotation(&self, version: ProtocolVersion) -> Result<Response, Error> {
        self.get_server_information("maprotation", version).await
    }

    async fn get_map_sequence(&self, version: ProtocolVersion) -> Result<Response, Error> {
        self.get_server_information("mapsequence", version).await
    }

    async fn get_server_session(&self, version: ProtocolVersion) -> Result<Response, Error> {
        self.get_server_information("session", version).await
    }

    async fn get_server_config(&self, version: ProtocolVersion) -> Result<Response, Error> {
        self.get_server_information("serverconfig", version).await
    }

    async fn get_banned_words(&self, version: ProtocolVersion) -> Result<Response, Error> {
        self.get_server_information("bannedwords", version).await
    }

    /// Shared body for the handful of read-only operations that all go
    /// through the same `GetServerInformation` v2 command with a different
    /// `Name` field. v1 has no equivalent for any of these.
    async fn get_server_information(
        &self,
        info_name: &str,
        version: ProtocolVersion,
    ) -> Result<Response, Error> {
        match version {
            ProtocolVersion::V2 => raise_for_status(
                self.execute(
                    "GetServerInformation",
                    version,
                    compact_json(&json!({"Name": info_name, "Value": ""})),
                )
                .await?,
            ),
            ProtocolVersion::V1 => Err(Error::Message(format!(
                "GetServerInformation({info_name}) has no v1 equivalent"
            ))),
        }
    }
}

impl<T: RconExecutor + ?Sized> RconCommands for T {}
