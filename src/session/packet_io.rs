//! Framed packet I/O over one transport, used under the session's I/O lock.

use tracing::trace;

use super::{SessionError, SessionResult};
use crate::protocol::frame::FrameBuffer;
use crate::protocol::{OpCode, PacketHeader};
use crate::transport::{Transport, TransportError, TryReceive};

/// Reads and writes framed packets over the session's transport.
///
/// All methods assume the caller holds the session I/O lock for the duration
/// of a complete exchange.
#[derive(Debug)]
pub(crate) struct PacketIo<T: Transport> {
    transport: T,
    max_payload: u64,
}

impl<T: Transport> PacketIo<T> {
    pub(crate) fn new(transport: T, max_payload: u64) -> Self {
        Self {
            transport,
            max_payload,
        }
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub(crate) fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Disconnects and passes the error through; protocol faults are fatal
    /// to the session.
    pub(crate) fn fail(&mut self, error: SessionError) -> SessionError {
        self.disconnect();
        error
    }

    fn surface(&mut self, error: &TransportError) -> SessionError {
        match error {
            TransportError::NotConnected => SessionError::NotConnected,
            TransportError::ConnectionLost
            | TransportError::TimedOut
            | TransportError::Io(_) => {
                self.disconnect();
                SessionError::ConnectionLost
            }
        }
    }

    /// Starts a packet frame: header with a payload-size placeholder, sized
    /// for `capacity` payload bytes.
    pub(crate) fn packet(opcode: OpCode, capacity: usize) -> FrameBuffer {
        let mut frame = FrameBuffer::with_capacity(PacketHeader::SIZE + capacity);
        let header = PacketHeader {
            opcode,
            payload_size: 0,
        };
        let mut bytes = [0u8; PacketHeader::SIZE];
        header.encode(&mut bytes);
        let _ = frame.put_bytes(&bytes);
        frame
    }

    /// Patches the real payload size into the frame and sends header plus
    /// payload in one ordered burst.
    pub(crate) fn send_packet(
        &mut self,
        opcode: OpCode,
        mut frame: FrameBuffer,
    ) -> SessionResult<()> {
        let total = frame.len();
        let payload_size = (total - PacketHeader::SIZE) as u64;
        frame.set_write_cursor(1);
        frame
            .put(payload_size)
            .map_err(|_| SessionError::Protocol)?;
        frame.set_write_cursor(total);
        trace!("send {opcode} ({payload_size} payload bytes)");
        self.transport
            .send_all(frame.written())
            .map_err(|e| self.surface(&e))
    }

    /// Receives the next packet. With `block` false, returns
    /// [`SessionError::WouldBlock`] if no header is available, consuming
    /// nothing.
    pub(crate) fn receive_next(
        &mut self,
        block: bool,
    ) -> SessionResult<(PacketHeader, FrameBuffer)> {
        let mut header_bytes = [0u8; PacketHeader::SIZE];
        if block {
            self.transport
                .receive_all(&mut header_bytes)
                .map_err(|e| self.surface(&e))?;
        } else {
            match self
                .transport
                .try_receive_all(&mut header_bytes)
                .map_err(|e| self.surface(&e))?
            {
                TryReceive::WouldBlock => return Err(SessionError::WouldBlock),
                TryReceive::Filled => {}
            }
        }

        let Some(header) = PacketHeader::decode(&header_bytes) else {
            return Err(self.fail(SessionError::Protocol));
        };
        if header.payload_size > self.max_payload {
            return Err(self.fail(SessionError::Protocol));
        }

        #[allow(clippy::cast_possible_truncation)] // bounded by max_payload
        let mut payload_bytes = vec![0u8; header.payload_size as usize];
        self.transport
            .receive_all(&mut payload_bytes)
            .map_err(|e| self.surface(&e))?;
        trace!("recv {} ({} payload bytes)", header.opcode, header.payload_size);
        Ok((header, FrameBuffer::from_vec(payload_bytes)))
    }

    /// Receives the next packet and requires it to carry `expected`. The
    /// protocol strictly alternates within an exchange, so anything else is a
    /// violation.
    pub(crate) fn receive_expected(
        &mut self,
        expected: OpCode,
        block: bool,
    ) -> SessionResult<FrameBuffer> {
        let (header, payload) = self.receive_next(block)?;
        if header.opcode != expected {
            return Err(self.fail(SessionError::Protocol));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::PacketIo;
    use crate::protocol::{OpCode, PacketHeader};
    use crate::session::SessionError;
    use crate::transport::{memory, Transport};
    use pretty_assertions::assert_eq;

    const MAX: u64 = 1024;

    fn io_pair() -> (PacketIo<memory::MemoryTransport>, PacketIo<memory::MemoryTransport>) {
        let (a, b) = memory::pair();
        (PacketIo::new(a, MAX), PacketIo::new(b, MAX))
    }

    #[test]
    fn framing_round_trip_for_every_opcode() {
        let (mut tx, mut rx) = io_pair();
        let opcodes = [
            OpCode::GetFileList,
            OpCode::GetFileListResult,
            OpCode::TransmitFile,
            OpCode::TransmitFileHash,
            OpCode::TransmitFileChunk,
            OpCode::TransmitFileChunkResult,
        ];
        for (i, opcode) in opcodes.into_iter().enumerate() {
            let payload = vec![i as u8; i * 3];
            let mut frame = PacketIo::<memory::MemoryTransport>::packet(opcode, payload.len());
            frame.put_bytes(&payload).unwrap();
            tx.send_packet(opcode, frame).unwrap();

            let (header, mut body) = rx.receive_next(true).unwrap();
            assert_eq!(header.opcode, opcode);
            assert_eq!(header.payload_size, payload.len() as u64);
            assert_eq!(body.take_bytes(payload.len()).unwrap(), &payload[..]);
        }
    }

    #[test]
    fn header_wire_shape() {
        let (mut tx, mut rx) = io_pair();
        let frame = PacketIo::<memory::MemoryTransport>::packet(OpCode::GetFileList, 0);
        tx.send_packet(OpCode::GetFileList, frame).unwrap();

        let mut raw = [0u8; PacketHeader::SIZE];
        rx.transport_mut().receive_all(&mut raw).unwrap();
        assert_eq!(raw, [0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn non_blocking_receive_would_block() {
        let (_tx, mut rx) = io_pair();
        rx.transport_mut().set_blocking(false).unwrap();
        assert_eq!(
            rx.receive_next(false).unwrap_err(),
            SessionError::WouldBlock
        );
        assert!(rx.is_connected());
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let (mut tx, mut rx) = io_pair();
        tx.transport_mut()
            .send_all(&[42, 0, 0, 0, 0, 0, 0, 0, 0])
            .unwrap();
        assert_eq!(rx.receive_next(true).unwrap_err(), SessionError::Protocol);
        assert!(!rx.is_connected());
    }

    #[test]
    fn oversized_payload_is_fatal() {
        let (mut tx, mut rx) = io_pair();
        // A hand-built header claiming more payload than the ceiling allows.
        let mut bytes = [0u8; PacketHeader::SIZE];
        PacketHeader {
            opcode: OpCode::TransmitFileChunk,
            payload_size: MAX + 1,
        }
        .encode(&mut bytes);
        tx.transport_mut().send_all(&bytes).unwrap();
        assert_eq!(rx.receive_next(true).unwrap_err(), SessionError::Protocol);
        assert!(!rx.is_connected());
    }

    #[test]
    fn unexpected_opcode_is_fatal() {
        let (mut tx, mut rx) = io_pair();
        let frame = PacketIo::<memory::MemoryTransport>::packet(OpCode::GetFileList, 0);
        tx.send_packet(OpCode::GetFileList, frame).unwrap();
        assert_eq!(
            rx.receive_expected(OpCode::TransmitFile, true).unwrap_err(),
            SessionError::Protocol
        );
        assert!(!rx.is_connected());
    }

    #[test]
    fn short_body_is_connection_lost() {
        let (mut tx, mut rx) = io_pair();
        // Header promises 10 payload bytes, only 3 arrive before close.
        let mut bytes = [0u8; PacketHeader::SIZE];
        PacketHeader {
            opcode: OpCode::GetFileList,
            payload_size: 10,
        }
        .encode(&mut bytes);
        tx.transport_mut().send_all(&bytes).unwrap();
        tx.transport_mut().send_all(&[1, 2, 3]).unwrap();
        tx.disconnect();
        assert_eq!(
            rx.receive_next(true).unwrap_err(),
            SessionError::ConnectionLost
        );
        assert!(!rx.is_connected());
    }
}
