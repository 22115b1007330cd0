//! Message type discriminators.
//!
//! The comm layer passes `type` through untouched. By convention the high
//! byte names a message group and the low byte an action within it; the
//! dispatch loop answers the comm group itself and forwards the rest.

/// Message groups (high byte of the type field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageGroup {
    Comm = 0x01,
    Nvm = 0x02,
    Key = 0x03,
    Crypto = 0x04,
    Custom = 0x0A,
}

impl MessageGroup {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(MessageGroup::Comm),
            0x02 => Some(MessageGroup::Nvm),
            0x03 => Some(MessageGroup::Key),
            0x04 => Some(MessageGroup::Crypto),
            0x0A => Some(MessageGroup::Custom),
            _ => None,
        }
    }
}

/// Actions of the comm group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommAction {
    /// Exchange client and server identifiers.
    Init = 0x01,
    /// Liveness check; also used for server-originated notifications.
    KeepAlive = 0x02,
    /// Client is done; server may drop session state.
    Close = 0x03,
    /// Returns the request payload unchanged.
    Echo = 0x04,
}

impl CommAction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(CommAction::Init),
            0x02 => Some(CommAction::KeepAlive),
            0x03 => Some(CommAction::Close),
            0x04 => Some(CommAction::Echo),
            _ => None,
        }
    }

    pub fn kind(self) -> u16 {
        MessageKind::new(MessageGroup::Comm as u8, self as u8).as_u16()
    }
}

/// A raw `type` field split into group and action bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKind(u16);

impl MessageKind {
    pub const fn new(group: u8, action: u8) -> Self {
        Self(((group as u16) << 8) | action as u16)
    }

    pub const fn from_u16(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn group_byte(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn action_byte(self) -> u8 {
        self.0 as u8
    }

    pub fn group(self) -> Option<MessageGroup> {
        MessageGroup::from_u8(self.group_byte())
    }

    /// Returns the comm action if this is a comm-group message.
    pub fn comm_action(self) -> Option<CommAction> {
        match self.group() {
            Some(MessageGroup::Comm) => CommAction::from_u8(self.action_byte()),
            _ => None,
        }
    }
}

impl From<u16> for MessageKind {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(MessageKind::from_u16(0x0A01).to_string(), "0x0A01");
    }

    #[test]
    fn test_kind_split() {
        let kind = MessageKind::new(MessageGroup::Crypto as u8, 0x10);
        assert_eq!(kind.as_u16(), 0x0410);
        assert_eq!(kind.group(), Some(MessageGroup::Crypto));
        assert_eq!(kind.action_byte(), 0x10);
        assert_eq!(kind.comm_action(), None);
    }

    #[test]
    fn test_comm_actions() {
        assert_eq!(CommAction::Init.kind(), 0x0101);
        assert_eq!(CommAction::Echo.kind(), 0x0104);
        assert_eq!(
            MessageKind::from_u16(0x0103).comm_action(),
            Some(CommAction::Close)
        );
        assert_eq!(MessageKind::from_u16(0x01FF).comm_action(), None);
    }

    #[test]
    fn test_unknown_group() {
        assert_eq!(MessageKind::from_u16(0x0010).group(), None);
        assert_eq!(MessageKind::from(0x0A01).group(), Some(MessageGroup::Custom));
    }
}
