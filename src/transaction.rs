//! Packs several operations into one bus transfer and splits the response

use crate::{
    bus::{Buffer, Transport},
    Error, FramingError, ProtocolError,
};

/// Anything that occupies a fixed-size segment of a transfer
pub trait Operation {
    type Output: Copy + Default;

    /// Bytes this operation clocks out, which is also what it clocks in
    fn transmitted_byte_count(&self) -> usize;

    /// Appends the transmitted bytes
    fn encode(&self, tx: &mut Buffer) -> Result<(), ProtocolError>;

    /// Parses this operation's segment of the response
    fn parse(&self, rx: &[u8]) -> Result<Self::Output, ProtocolError>;
}

/// Runs all `ops` in a single transfer, returning their results in the same order.
///
/// Either every operation succeeds or none of the results are returned.
pub fn transact<T, O, const N: usize>(
    transport: &mut T,
    ops: &[O; N],
) -> Result<[O::Output; N], Error<T::Error>>
where
    T: Transport,
    O: Operation,
{
    let mut buf = Buffer::new();

    for op in ops {
        op.encode(&mut buf)?;
    }

    let sent = buf.len();
    let expected: usize = ops.iter().map(Operation::transmitted_byte_count).sum();
    if sent != expected {
        return Err(FramingError::EncodedLength {
            expected,
            encoded: sent,
        }
        .into());
    }

    debug!("transfer of {} bytes, {} operations", sent, N);

    transport.transfer(&mut buf).map_err(|e| {
        warn!("bus transfer of {} bytes failed", sent);
        Error::Transport(e)
    })?;

    if buf.len() != sent {
        return Err(FramingError::LengthMismatch {
            sent,
            received: buf.len(),
        }
        .into());
    }

    let mut results = [<O::Output as Default>::default(); N];
    let mut begin = 0;

    for (op, result) in ops.iter().zip(results.iter_mut()) {
        let end = begin + op.transmitted_byte_count();
        *result = op.parse(&buf[begin..end])?;
        begin = end;
    }

    Ok(results)
}
