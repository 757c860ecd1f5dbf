//! Linux SocketCAN driver for hardware ports

use super::hil::BusDriver;
use crate::types::CanMessage;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};
use std::io;
use std::time::Duration;

/// Raw CAN socket bound to one interface (e.g. `can0`, `vcan0`)
pub struct SocketCanDriver {
    socket: CanSocket,
}

impl SocketCanDriver {
    pub fn open(channel: &str) -> io::Result<Self> {
        let socket = CanSocket::open(channel)?;
        Ok(Self { socket })
    }
}

impl BusDriver for SocketCanDriver {
    fn transmit(&mut self, message: &CanMessage) -> io::Result<()> {
        let invalid = |what: &str| io::Error::new(io::ErrorKind::InvalidInput, format!("{} for {}", what, message));

        let id = if message.is_extended {
            ExtendedId::new(message.can_id).map(Id::Extended)
        } else {
            u16::try_from(message.can_id)
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard)
        }
        .ok_or_else(|| invalid("invalid CAN id"))?;

        let frame = CanFrame::new(id, &message.data).ok_or_else(|| invalid("invalid payload"))?;
        self.socket.write_frame(&frame)
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Option<CanMessage>> {
        // A zero SO_RCVTIMEO blocks forever
        self.socket.set_read_timeout(timeout.max(super::hil::MIN_DRIVER_TIMEOUT))?;

        match self.socket.read_frame() {
            Ok(frame) => {
                let (can_id, is_extended) = match EmbeddedFrame::id(&frame) {
                    Id::Standard(id) => (id.as_raw() as u32, false),
                    Id::Extended(id) => (id.as_raw(), true),
                };
                let message = CanMessage::new(can_id, EmbeddedFrame::data(&frame).to_vec())
                    .with_extended_id(is_extended);
                Ok(Some(message))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
