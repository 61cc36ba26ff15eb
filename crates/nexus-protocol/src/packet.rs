//! The binary frame layout.
//!
//! There is no length prefix: the transport delivers one frame per
//! message, so every decoder here works on a complete byte slice.
//!
//! ```text
//! client → server
//!   [0, hub_cmd, json...]                      hub command (create/join)
//!   [1, 0, origin, dest, except, payload...]   relay request
//!   [1, 1]                                     leave room
//!   [1, 2, flag]                               set allow-join (host only)
//!   [5, ...]                                   echo, returned verbatim
//!
//! server → client
//!   [2, category, code, message...]            status
//!   [1, 3, peer, state, name...]               player state
//!   [1, 0, origin, dest, payload...]           relayed payload
//! ```
//!
//! The `origin` byte of a relay request is never trusted: the room
//! overwrites it with the sender's slot before building the envelope.

use crate::{
    Codec, PeerId, PlayerState, ProtocolError, RoomRequest, StatusCategory,
};

/// Top-level opcodes (byte 0).
pub mod opcode {
    /// Client → hub command.
    pub const HUB: u8 = 0;
    /// Room traffic, both directions.
    pub const ROOM: u8 = 1;
    /// Server → client status.
    pub const STATUS: u8 = 2;
    /// Echo/diagnostic.
    pub const ECHO: u8 = 5;
}

/// Hub sub-opcodes (byte 1 of a hub command).
pub mod hub_op {
    pub const CREATE_ROOM: u8 = 0;
    pub const JOIN_ROOM: u8 = 1;
}

/// Room sub-opcodes (byte 1 of room traffic).
pub mod room_op {
    /// Client relay request / server relay envelope.
    pub const PEER_PACKET: u8 = 0;
    /// Client leave request.
    pub const LEAVE: u8 = 1;
    /// Client allow-join toggle.
    pub const TOGGLE_JOIN: u8 = 2;
    /// Server player-state packet.
    pub const PLAYER_STATE: u8 = 3;
}

/// Bytes of a relay request before the payload: sub-op, origin, dest, except.
const RELAY_HEADER_LEN: usize = 4;

// ---------------------------------------------------------------------------
// ClientFrame: top-level dispatch
// ---------------------------------------------------------------------------

/// A frame received from a client, classified by its first byte.
///
/// `Hub` and `Room` borrow everything after the opcode byte; that
/// remainder is what gets queued on the hub's or the room's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFrame<'a> {
    /// A hub command: `[hub_cmd, json...]`.
    Hub(&'a [u8]),
    /// Room traffic: `[room_cmd, ...]`.
    Room(&'a [u8]),
    /// Echo request; the full frame is sent back unchanged.
    Echo,
}

impl<'a> ClientFrame<'a> {
    /// Classifies a raw frame.
    ///
    /// # Errors
    /// - [`ProtocolError::Empty`] for a zero-length frame
    /// - [`ProtocolError::Truncated`] when a hub or room frame has no
    ///   sub-opcode
    /// - [`ProtocolError::UnknownOpcode`] for any other first byte
    pub fn decode(frame: &'a [u8]) -> Result<Self, ProtocolError> {
        let (&op, rest) = frame.split_first().ok_or(ProtocolError::Empty)?;
        match op {
            opcode::HUB | opcode::ROOM if rest.is_empty() => {
                Err(ProtocolError::Truncated {
                    opcode: op,
                    len: frame.len(),
                })
            }
            opcode::HUB => Ok(Self::Hub(rest)),
            opcode::ROOM => Ok(Self::Room(rest)),
            opcode::ECHO => Ok(Self::Echo),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// HubRequest
// ---------------------------------------------------------------------------

/// A decoded hub command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubRequest {
    CreateRoom(RoomRequest),
    JoinRoom(RoomRequest),
}

impl HubRequest {
    /// Decodes `[hub_cmd, json...]` using `codec` for the body.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownHubCommand`] for an unknown sub-opcode and
    /// [`ProtocolError::Decode`] when the body does not parse.
    pub fn decode(body: &[u8], codec: &impl Codec) -> Result<Self, ProtocolError> {
        let (&op, json) = body.split_first().ok_or(ProtocolError::Truncated {
            opcode: opcode::HUB,
            len: body.len(),
        })?;
        match op {
            hub_op::CREATE_ROOM => Ok(Self::CreateRoom(codec.decode(json)?)),
            hub_op::JOIN_ROOM => Ok(Self::JoinRoom(codec.decode(json)?)),
            other => Err(ProtocolError::UnknownHubCommand(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomFrame
// ---------------------------------------------------------------------------

/// A decoded client → room frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomFrame<'a> {
    /// Relay `payload` to `dest` (or everyone for broadcast), skipping
    /// `except`. The client's origin byte has already been discarded.
    PeerPacket {
        dest: PeerId,
        except: PeerId,
        payload: &'a [u8],
    },
    /// Leave the room.
    Leave,
    /// Host sets whether new peers may join.
    SetAllowJoin(bool),
}

impl<'a> RoomFrame<'a> {
    /// Decodes room traffic (the bytes after the top-level opcode).
    ///
    /// # Errors
    /// [`ProtocolError::Truncated`] for a relay request without payload and
    /// [`ProtocolError::UnknownRoomCommand`] for every other shape.
    pub fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        match body {
            [room_op::PEER_PACKET, ..] if body.len() <= RELAY_HEADER_LEN => {
                Err(ProtocolError::Truncated {
                    opcode: room_op::PEER_PACKET,
                    len: body.len(),
                })
            }
            [room_op::PEER_PACKET, _origin, dest, except, payload @ ..] => {
                Ok(Self::PeerPacket {
                    dest: PeerId(*dest),
                    except: PeerId(*except),
                    payload,
                })
            }
            [room_op::LEAVE] => Ok(Self::Leave),
            [room_op::TOGGLE_JOIN, flag] => Ok(Self::SetAllowJoin(*flag != 0)),
            [op, ..] => Err(ProtocolError::UnknownRoomCommand(*op)),
            [] => Err(ProtocolError::Empty),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerPacket
// ---------------------------------------------------------------------------

/// A packet the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    /// `[2, category, code, message...]`
    Status {
        category: StatusCategory,
        code: u8,
        message: String,
    },
    /// `[1, 3, peer, state, name...]`
    PlayerState {
        peer: PeerId,
        state: PlayerState,
        name: String,
    },
    /// `[1, 0, origin, dest, payload...]`
    Relay {
        origin: PeerId,
        dest: PeerId,
        payload: Vec<u8>,
    },
}

impl ServerPacket {
    /// Shorthand for a status packet.
    pub fn status(
        category: StatusCategory,
        code: u8,
        message: impl Into<String>,
    ) -> Self {
        Self::Status {
            category,
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a player-state packet.
    pub fn player(peer: PeerId, state: PlayerState, name: &str) -> Self {
        Self::PlayerState {
            peer,
            state,
            name: name.to_owned(),
        }
    }

    /// Serializes the packet into a single frame.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Status {
                category,
                code,
                message,
            } => {
                let mut b = Vec::with_capacity(3 + message.len());
                b.extend_from_slice(&[opcode::STATUS, *category as u8, *code]);
                b.extend_from_slice(message.as_bytes());
                b
            }
            Self::PlayerState { peer, state, name } => {
                let mut b = Vec::with_capacity(4 + name.len());
                b.extend_from_slice(&[
                    opcode::ROOM,
                    room_op::PLAYER_STATE,
                    peer.0,
                    *state as u8,
                ]);
                b.extend_from_slice(name.as_bytes());
                b
            }
            Self::Relay {
                origin,
                dest,
                payload,
            } => {
                let mut b = Vec::with_capacity(4 + payload.len());
                b.extend_from_slice(&[
                    opcode::ROOM,
                    room_op::PEER_PACKET,
                    origin.0,
                    dest.0,
                ]);
                b.extend_from_slice(payload);
                b
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JsonCodec, status_code};

    // =====================================================================
    // ClientFrame
    // =====================================================================

    #[test]
    fn test_client_frame_decode_routes_by_first_byte() {
        assert_eq!(
            ClientFrame::decode(&[0, 1, b'{']).unwrap(),
            ClientFrame::Hub(&[1, b'{'])
        );
        assert_eq!(
            ClientFrame::decode(&[1, 1]).unwrap(),
            ClientFrame::Room(&[1])
        );
        assert_eq!(ClientFrame::decode(&[5, 9, 9]).unwrap(), ClientFrame::Echo);
    }

    #[test]
    fn test_client_frame_decode_empty_returns_empty() {
        assert!(matches!(ClientFrame::decode(&[]), Err(ProtocolError::Empty)));
    }

    #[test]
    fn test_client_frame_decode_bare_opcode_returns_truncated() {
        assert!(matches!(
            ClientFrame::decode(&[1]),
            Err(ProtocolError::Truncated { opcode: 1, len: 1 })
        ));
        assert!(matches!(
            ClientFrame::decode(&[0]),
            Err(ProtocolError::Truncated { opcode: 0, len: 1 })
        ));
    }

    #[test]
    fn test_client_frame_decode_unknown_opcode() {
        assert!(matches!(
            ClientFrame::decode(&[2, 0, 0]),
            Err(ProtocolError::UnknownOpcode(2))
        ));
        assert!(matches!(
            ClientFrame::decode(&[200]),
            Err(ProtocolError::UnknownOpcode(200))
        ));
    }

    // =====================================================================
    // HubRequest
    // =====================================================================

    #[test]
    fn test_hub_request_decode_create() {
        let mut body = vec![hub_op::CREATE_ROOM];
        body.extend_from_slice(
            br#"{"room_pwd":"pw","app_name":"demo","player_name":"Alice"}"#,
        );
        let req = HubRequest::decode(&body, &JsonCodec).unwrap();
        let HubRequest::CreateRoom(req) = req else {
            panic!("expected CreateRoom");
        };
        assert_eq!(req.secret, "pw");
        assert_eq!(req.player_name, "Alice");
    }

    #[test]
    fn test_hub_request_decode_join() {
        let mut body = vec![hub_op::JOIN_ROOM];
        body.extend_from_slice(br#"{"room_id":"abc"}"#);
        let req = HubRequest::decode(&body, &JsonCodec).unwrap();
        assert!(matches!(req, HubRequest::JoinRoom(r) if r.room_code == "abc"));
    }

    #[test]
    fn test_hub_request_decode_bad_json_returns_decode_error() {
        let body = [hub_op::JOIN_ROOM, b'{', b'x'];
        assert!(matches!(
            HubRequest::decode(&body, &JsonCodec),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_hub_request_decode_unknown_sub_opcode() {
        assert!(matches!(
            HubRequest::decode(&[7, b'{', b'}'], &JsonCodec),
            Err(ProtocolError::UnknownHubCommand(7))
        ));
    }

    // =====================================================================
    // RoomFrame
    // =====================================================================

    #[test]
    fn test_room_frame_decode_peer_packet_discards_origin() {
        let frame = RoomFrame::decode(&[0, 42, 0, 255, 7, 8]).unwrap();
        assert_eq!(
            frame,
            RoomFrame::PeerPacket {
                dest: PeerId(0),
                except: PeerId(255),
                payload: &[7, 8],
            }
        );
    }

    #[test]
    fn test_room_frame_decode_peer_packet_without_payload_is_truncated() {
        assert!(matches!(
            RoomFrame::decode(&[0, 0, 1, 255]),
            Err(ProtocolError::Truncated { opcode: 0, len: 4 })
        ));
        assert!(matches!(
            RoomFrame::decode(&[0]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_room_frame_decode_leave_and_toggle() {
        assert_eq!(RoomFrame::decode(&[1]).unwrap(), RoomFrame::Leave);
        assert_eq!(
            RoomFrame::decode(&[2, 1]).unwrap(),
            RoomFrame::SetAllowJoin(true)
        );
        assert_eq!(
            RoomFrame::decode(&[2, 0]).unwrap(),
            RoomFrame::SetAllowJoin(false)
        );
    }

    #[test]
    fn test_room_frame_decode_wrong_shapes_are_rejected() {
        // Leave carries no arguments; toggle carries exactly one.
        assert!(matches!(
            RoomFrame::decode(&[1, 0]),
            Err(ProtocolError::UnknownRoomCommand(1))
        ));
        assert!(matches!(
            RoomFrame::decode(&[2]),
            Err(ProtocolError::UnknownRoomCommand(2))
        ));
        assert!(matches!(
            RoomFrame::decode(&[9, 9]),
            Err(ProtocolError::UnknownRoomCommand(9))
        ));
    }

    // =====================================================================
    // ServerPacket
    // =====================================================================

    #[test]
    fn test_server_packet_status_layout() {
        let bytes = ServerPacket::status(
            StatusCategory::Notice,
            status_code::CAPACITY,
            "full",
        )
        .encode();
        assert_eq!(bytes, vec![2, 2, 111, b'f', b'u', b'l', b'l']);
    }

    #[test]
    fn test_server_packet_status_without_message_is_three_bytes() {
        let bytes = ServerPacket::status(StatusCategory::Joined, 0, "").encode();
        assert_eq!(bytes, vec![2, 5, 0]);
    }

    #[test]
    fn test_server_packet_player_state_layout() {
        let bytes =
            ServerPacket::player(PeerId(1), PlayerState::Present, "Bob").encode();
        assert_eq!(bytes, vec![1, 3, 1, 1, b'B', b'o', b'b']);
    }

    #[test]
    fn test_server_packet_relay_layout() {
        let bytes = ServerPacket::Relay {
            origin: PeerId(2),
            dest: PeerId::BROADCAST,
            payload: vec![0xAA, 0xBB],
        }
        .encode();
        assert_eq!(bytes, vec![1, 0, 2, 255, 0xAA, 0xBB]);
    }
}
