use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::types::{LinkStatus, MasterAddr};
use crate::error::{Error, Result};

const SENTINEL: &[u8] = b"sentinel";
const GET_MASTER_ADDR_BY_NAME: &[u8] = b"get-master-addr-by-name";

/// Longest array accepted from a peer. Sentinel replies carry two
/// elements and our own requests three.
const MAX_MULTI_BULK_LEN: i64 = 16;

/// Decoded multi-bulk reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `*-1`: the sentinel does not know the requested master.
    Null,
    Bulks(Vec<Bytes>),
}

/// Encode `SENTINEL get-master-addr-by-name <name>` as a RESP array.
pub fn encode_get_master_addr(name: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + name.len());
    buf.extend_from_slice(b"*3\r\n");
    put_bulk(&mut buf, SENTINEL);
    put_bulk(&mut buf, GET_MASTER_ADDR_BY_NAME);
    put_bulk(&mut buf, name.as_bytes());
    buf.freeze()
}

#[inline]
fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(b'$');
    buf.extend_from_slice(itoa::Buffer::new().format(data.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

/// Read one line, without its trailing CRLF, into `line`.
///
/// EOF, an I/O error or a line cut short are all reported as
/// [`Error::PeerClosed`].
async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let n = reader
        .read_until(b'\n', line)
        .await
        .map_err(|_| Error::PeerClosed)?;
    if n == 0 || line.last() != Some(&b'\n') {
        return Err(Error::PeerClosed);
    }
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(())
}

/// Parse the integer after a `*` or `$` header byte.
fn parse_len(header: &[u8], what: &str) -> Result<i64> {
    std::str::from_utf8(&header[1..])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            Error::Framing(format!(
                "invalid {} length '{}'",
                what,
                String::from_utf8_lossy(&header[1..])
            ))
        })
}

/// Decode a multi-bulk reply.
///
/// The returned [`LinkStatus`] tells the caller whether the connection is
/// still worth reusing: only a failed or empty line read marks it broken,
/// framing violations leave it usable.
pub async fn read_multi_bulk<R>(reader: &mut R) -> (Result<Reply>, LinkStatus)
where
    R: AsyncBufRead + Unpin,
{
    match decode_multi_bulk(reader).await {
        Ok(reply) => (Ok(reply), LinkStatus::Usable),
        Err(e) => {
            let status = if e.is_connection_error() {
                LinkStatus::Broken
            } else {
                LinkStatus::Usable
            };
            (Err(e), status)
        }
    }
}

async fn decode_multi_bulk<R>(reader: &mut R) -> Result<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(64);

    read_line(reader, &mut line).await?;
    if line.is_empty() {
        return Err(Error::PeerClosed);
    }
    if line[0] != b'*' {
        return Err(Error::Framing("first char in mbulk is not *".into()));
    }

    let count = parse_len(&line, "multi-bulk")?;
    if count == -1 {
        return Ok(Reply::Null);
    }
    if count < 0 {
        return Err(Error::Framing(format!("negative multi-bulk length {}", count)));
    }
    if count > MAX_MULTI_BULK_LEN {
        return Err(Error::Framing(format!("multi-bulk length {} too large", count)));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        read_line(reader, &mut line).await?;
        if line.is_empty() {
            return Err(Error::PeerClosed);
        }
        if line[0] != b'$' {
            return Err(Error::Framing("first char in bulk is not $".into()));
        }
        let declared = parse_len(&line, "bulk")?;
        if declared < 0 {
            return Err(Error::Framing("null bulk string in reply".into()));
        }

        read_line(reader, &mut line).await?;
        if line.is_empty() && declared > 0 {
            return Err(Error::PeerClosed);
        }
        if line.len() as i64 != declared {
            return Err(Error::Framing(format!(
                "wrong bulk size: declared {}, read {}",
                declared,
                line.len()
            )));
        }
        items.push(Bytes::copy_from_slice(&line));
    }

    Ok(Reply::Bulks(items))
}

/// Decode the answer to `get-master-addr-by-name` for database `name`.
pub async fn read_master_addr_reply<R>(
    reader: &mut R,
    name: &str,
) -> (Result<MasterAddr>, LinkStatus)
where
    R: AsyncBufRead + Unpin,
{
    let (reply, status) = read_multi_bulk(reader).await;
    let result = match reply {
        Ok(Reply::Bulks(parts)) => MasterAddr::from_reply(parts),
        Ok(Reply::Null) => Err(Error::NullReply(name.to_string())),
        Err(e) => Err(e),
    };
    (result, status)
}

/// Write the request for `name`, flush it and read the reply off `stream`.
pub async fn get_master_addr_by_name<S>(
    stream: &mut S,
    name: &str,
) -> (Result<MasterAddr>, LinkStatus)
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let request = encode_get_master_addr(name);
    if let Err(e) = stream.write_all(&request).await {
        log::error!("write to sentinel error: {}", e);
        return (Err(Error::Io(e)), LinkStatus::Broken);
    }
    if let Err(e) = stream.flush().await {
        log::error!("flush sentinel writer error: {}", e);
        return (Err(Error::Io(e)), LinkStatus::Broken);
    }
    log::debug!("write to sentinel success: {} bytes", request.len());

    read_master_addr_reply(stream, name).await
}
