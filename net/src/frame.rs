//! Length-delimited framing shared by every bus socket.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed(stream: TcpStream) -> FramedStream {
    Framed::new(stream, LengthDelimitedCodec::new())
}

const SUBSCRIBE: u8 = 1;
const UNSUBSCRIBE: u8 = 0;

/// Filter updates a subscriber sends upstream to its publisher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    Subscribe(Bytes),
    Unsubscribe(Bytes),
}

impl Control {
    pub fn encode(&self) -> Bytes {
        let (tag, prefix) = match self {
            Control::Subscribe(p) => (SUBSCRIBE, p),
            Control::Unsubscribe(p) => (UNSUBSCRIBE, p),
        };
        let mut buf = BytesMut::with_capacity(1 + prefix.len());
        buf.put_u8(tag);
        buf.put_slice(prefix);
        buf.freeze()
    }

    pub fn decode(frame: &[u8]) -> Option<Self> {
        let (tag, prefix) = frame.split_first()?;
        let prefix = Bytes::copy_from_slice(prefix);
        match *tag {
            SUBSCRIBE => Some(Control::Subscribe(prefix)),
            UNSUBSCRIBE => Some(Control::Unsubscribe(prefix)),
            _ => None,
        }
    }
}
