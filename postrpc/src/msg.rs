use crate::{Buffer, Map, Token, Value, transfer};

const TOKEN: &str = "token";
const METHOD: &str = "method";
const PAYLOAD: &str = "payload";
const ERROR: &str = "error";
const EVENT_NAME: &str = "eventName";

/// Messages exchanged between a [`Client`](crate::Client) and a
/// [`Server`](crate::Server).
///
/// Inbound traffic is matched exhaustively on this enum. Anything that is not
/// one of the four protocol shapes is carried as `Unrecognized` and ignored by
/// both roles.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client to server: invoke `method` with `payload`.
    Call {
        token: Token,
        method: String,
        payload: Value,
    },
    /// Server to client: `method` completed with `payload`.
    Reply {
        token: Token,
        method: String,
        payload: Value,
    },
    /// Server to client: the call failed remotely.
    Error { token: Token, error: String },
    /// Server to client, one-way.
    Notification { event_name: String, payload: Value },
    /// Foreign traffic sharing the channel.
    Unrecognized(Value),
}

/// Which role decodes a JSON message.
///
/// `{ token, method, payload }` is a call on the server side and a reply on
/// the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Message {
    /// Returns the correlation token, if the message carries one.
    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        match self {
            Message::Call { token, .. }
            | Message::Reply { token, .. }
            | Message::Error { token, .. } => Some(token),
            Message::Notification { .. } | Message::Unrecognized(_) => None,
        }
    }

    /// Returns the payload whose buffers travel with this message.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Message::Call { payload, .. }
            | Message::Reply { payload, .. }
            | Message::Notification { payload, .. }
            | Message::Unrecognized(payload) => Some(payload),
            Message::Error { .. } => None,
        }
    }

    /// Renders the message in its wire shape. A `Null` payload is omitted.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        match self {
            Message::Call {
                token,
                method,
                payload,
            }
            | Message::Reply {
                token,
                method,
                payload,
            } => {
                map.insert(TOKEN.into(), token.to_string().into());
                map.insert(METHOD.into(), method.as_str().into());
                if !payload.is_null() {
                    map.insert(PAYLOAD.into(), payload.clone());
                }
            }
            Message::Error { token, error } => {
                map.insert(TOKEN.into(), token.to_string().into());
                map.insert(ERROR.into(), error.as_str().into());
            }
            Message::Notification {
                event_name,
                payload,
            } => {
                map.insert(EVENT_NAME.into(), event_name.as_str().into());
                if !payload.is_null() {
                    map.insert(PAYLOAD.into(), payload.clone());
                }
            }
            Message::Unrecognized(value) => return value.clone(),
        }
        Value::Object(map)
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }

    /// Classifies a structured value by the fields it carries.
    ///
    /// An `error` with a token wins over a `method` with a token, which wins
    /// over an `eventName`. A token that does not parse makes the message
    /// unrecognized.
    #[must_use]
    pub fn from_value(value: Value, side: Side) -> Self {
        let Value::Object(map) = &value else {
            return Message::Unrecognized(value);
        };
        let string = |key: &str| map.get(key).and_then(Value::as_str);
        let token = string(TOKEN).and_then(Token::parse);
        let payload = || map.get(PAYLOAD).cloned().unwrap_or_default();

        if let (Some(token), Some(error)) = (token, map.get(ERROR)) {
            let error = match error {
                Value::String(s) => s.clone(),
                other => other.to_json().to_string(),
            };
            return Message::Error { token, error };
        }
        if let (Some(token), Some(method)) = (token, string(METHOD)) {
            let method = method.to_owned();
            return match side {
                Side::Server => Message::Call {
                    token,
                    method,
                    payload: payload(),
                },
                Side::Client => Message::Reply {
                    token,
                    method,
                    payload: payload(),
                },
            };
        }
        if let Some(event_name) = string(EVENT_NAME) {
            return Message::Notification {
                event_name: event_name.to_owned(),
                payload: payload(),
            };
        }
        Message::Unrecognized(value)
    }

    #[must_use]
    pub fn from_json(value: serde_json::Value, side: Side) -> Self {
        Self::from_value(value.into(), side)
    }
}

/// A message plus the buffers whose ownership moves with it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message: Message,
    pub transfer: Vec<Buffer>,
}

impl Envelope {
    /// Wraps `message`, scanning its payload for transferable buffers.
    #[must_use]
    pub fn new(message: Message) -> Self {
        let transfer = message.payload().map(transfer::detect).unwrap_or_default();
        Self { message, transfer }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}
