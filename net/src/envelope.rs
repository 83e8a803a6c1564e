//! Message envelope exchanged between publishers and subscribers.
//!
//! On the wire an envelope is the registry [`EncodingKey`] followed by a JSON
//! body carrying the sender identity and a kind-tagged payload. Keeping the
//! key as a raw prefix lets subscribers filter traffic before anything is
//! deserialized.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{EncodingKey, NetError, ENCODING_SIZE};

/// Data types that can travel on the bus.
///
/// `KIND` is the stable type identifier written next to the payload body.
pub trait BusData: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// A kind-tagged, not yet interpreted payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    kind: String,
    body: Value,
}

impl Payload {
    /// Serialize `data` into a payload tagged with its kind.
    pub fn new<T: BusData>(data: &T) -> Result<Self, NetError> {
        let body = serde_json::to_value(data)
            .map_err(|e| NetError::MalformedEnvelope(e.to_string()))?;
        Ok(Self {
            kind: T::KIND.to_string(),
            body,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether this payload was produced from a `T`.
    pub fn is<T: BusData>(&self) -> bool {
        self.kind == T::KIND
    }

    /// Interpret the payload as a `T`.
    ///
    /// Fails with [`NetError::UnexpectedKind`] when the payload carries a
    /// different kind, and with [`NetError::MalformedEnvelope`] when the body
    /// does not match `T`'s shape.
    pub fn decode<T: BusData>(&self) -> Result<T, NetError> {
        if !self.is::<T>() {
            return Err(NetError::UnexpectedKind {
                expected: T::KIND.to_string(),
                actual: self.kind.clone(),
            });
        }
        serde_json::from_value(self.body.clone())
            .map_err(|e| NetError::MalformedEnvelope(e.to_string()))
    }
}

#[derive(Serialize)]
struct BodyRef<'a> {
    sender: &'a str,
    payload: &'a Payload,
}

#[derive(Deserialize)]
struct Body {
    sender: String,
    payload: Payload,
}

/// The (encoding, sender, payload) triple exchanged over the bus.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub key: EncodingKey,
    pub sender: String,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(key: EncodingKey, sender: impl Into<String>, payload: Payload) -> Self {
        Self {
            key,
            sender: sender.into(),
            payload,
        }
    }

    pub fn encode(&self) -> Result<Bytes, NetError> {
        let body = serde_json::to_vec(&BodyRef {
            sender: &self.sender,
            payload: &self.payload,
        })
        .map_err(|e| NetError::MalformedEnvelope(e.to_string()))?;
        let mut buf = BytesMut::with_capacity(ENCODING_SIZE + body.len());
        buf.put_slice(self.key.as_bytes());
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    pub fn decode(frame: &[u8]) -> Result<Self, NetError> {
        if frame.len() < ENCODING_SIZE {
            return Err(NetError::MalformedEnvelope(format!(
                "frame of {} bytes is shorter than the topic key",
                frame.len()
            )));
        }
        let (prefix, rest) = frame.split_at(ENCODING_SIZE);
        let key = EncodingKey::from_slice(prefix)
            .ok_or_else(|| NetError::MalformedEnvelope("bad topic key".into()))?;
        let body: Body =
            serde_json::from_slice(rest).map_err(|e| NetError::MalformedEnvelope(e.to_string()))?;
        Ok(Self {
            key,
            sender: body.sender,
            payload: body.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Text {
        data: String,
    }

    impl BusData for Text {
        const KIND: &'static str = "test.text";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Number(u32);

    impl BusData for Number {
        const KIND: &'static str = "test.number";
    }

    #[test]
    fn envelope_keeps_key_as_prefix() {
        let payload = Payload::new(&Text { data: "hi".into() }).unwrap();
        let env = Envelope::new(EncodingKey::new([0, 0, 7]), "pc:5000", payload);
        let bytes = env.encode().unwrap();
        assert_eq!(&bytes[..ENCODING_SIZE], &[0, 0, 7]);
        let back = Envelope::decode(&bytes).unwrap();
        assert_eq!(back.sender, "pc:5000");
        assert_eq!(back.payload.decode::<Text>().unwrap().data, "hi");
    }

    #[test]
    fn wrong_kind_is_distinguished_from_garbage() {
        let payload = Payload::new(&Text { data: "hi".into() }).unwrap();
        assert!(matches!(
            payload.decode::<Number>(),
            Err(NetError::UnexpectedKind { .. })
        ));
        assert!(matches!(
            Envelope::decode(&[0, 0, 1, b'{']),
            Err(NetError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            Envelope::decode(&[0, 1]),
            Err(NetError::MalformedEnvelope(_))
        ));
    }
}
