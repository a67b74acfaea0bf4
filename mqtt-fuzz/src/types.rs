use bytes::Bytes;
use num_enum::TryFromPrimitive;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid hex input")]
    InvalidHex,
    #[error("invalid packet type nibble {0}")]
    InvalidPacketType(u8),
    #[error("variable byte integer has more than 4 bytes")]
    InvalidVariableInt,
    #[error("packet declares {declared} bytes but only {available} are present")]
    IncompletePacket { declared: usize, available: usize },
    #[error("cursor overrun: needed {needed} bytes at offset {position}, packet ends at {end}")]
    CursorOverrun { position: usize, needed: usize, end: usize },
    #[error("unknown property identifier 0x{0:02x}")]
    InvalidPropertyId(u8),
    #[error("property block declares {declared} bytes but {consumed} were consumed")]
    PropertyLengthMismatch { declared: usize, consumed: usize },
    #[error("{count} trailing bytes after the last field")]
    TrailingBytes { count: usize },
    #[error("stream ended {} bytes into an unfinished packet", .0.len())]
    TruncatedStream(Bytes),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    #[error("no seed packets available for {0}")]
    CorpusExhaustion(PacketType),
    #[error("cannot remove or mutate bytes of an empty buffer")]
    MalformedMutationInput,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
pub enum ProtocolVersion {
    V311 = 4,
    V500 = 5,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive)]
pub enum PacketType {
    Connect = 1,
    ConnectAck = 2,
    Publish = 3,
    PublishAck = 4,
    PublishReceived = 5,
    PublishRelease = 6,
    PublishComplete = 7,
    Subscribe = 8,
    SubscribeAck = 9,
    Unsubscribe = 10,
    UnsubscribeAck = 11,
    PingRequest = 12,
    PingResponse = 13,
    Disconnect = 14,
    Authenticate = 15,
}

impl PacketType {
    pub const ALL: [PacketType; 15] = [
        PacketType::Connect,
        PacketType::ConnectAck,
        PacketType::Publish,
        PacketType::PublishAck,
        PacketType::PublishReceived,
        PacketType::PublishRelease,
        PacketType::PublishComplete,
        PacketType::Subscribe,
        PacketType::SubscribeAck,
        PacketType::Unsubscribe,
        PacketType::UnsubscribeAck,
        PacketType::PingRequest,
        PacketType::PingResponse,
        PacketType::Disconnect,
        PacketType::Authenticate,
    ];

    /// The upper-case control packet name, which is also the corpus file name.
    pub fn name(&self) -> &'static str {
        match self {
            PacketType::Connect => "CONNECT",
            PacketType::ConnectAck => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::PublishAck => "PUBACK",
            PacketType::PublishReceived => "PUBREC",
            PacketType::PublishRelease => "PUBREL",
            PacketType::PublishComplete => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::SubscribeAck => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::UnsubscribeAck => "UNSUBACK",
            PacketType::PingRequest => "PINGREQ",
            PacketType::PingResponse => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
            PacketType::Authenticate => "AUTH",
        }
    }

    /// Reads the packet type from the high nibble of a fixed header byte.
    pub fn from_fixed_header(first_byte: u8) -> Result<Self, DecodeError> {
        let nibble = (first_byte & 0b1111_0000) >> 4;
        PacketType::try_from(nibble).map_err(|_| DecodeError::InvalidPacketType(nibble))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
pub enum PropertyType {
    PayloadFormatIndicator = 1,
    MessageExpiryInterval = 2,
    ContentType = 3,
    ResponseTopic = 8,
    CorrelationData = 9,
    SubscriptionIdentifier = 11,
    SessionExpiryInterval = 17,
    AssignedClientIdentifier = 18,
    ServerKeepAlive = 19,
    AuthenticationMethod = 21,
    AuthenticationData = 22,
    RequestProblemInformation = 23,
    WillDelayInterval = 24,
    RequestResponseInformation = 25,
    ResponseInformation = 26,
    ServerReference = 28,
    ReasonString = 31,
    ReceiveMaximum = 33,
    TopicAliasMaximum = 34,
    TopicAlias = 35,
    MaximumQos = 36,
    RetainAvailable = 37,
    UserProperty = 38,
    MaximumPacketSize = 39,
    WildcardSubscriptionAvailable = 40,
    SubscriptionIdentifierAvailable = 41,
    SharedSubscriptionAvailable = 42,
}

/// How the value following a property identifier is laid out on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PropertyLayout {
    Byte,
    TwoByteInt,
    FourByteInt,
    VariableByteInt,
    String,
    BinaryData,
    StringPair,
}

impl PropertyType {
    pub fn field_name(&self) -> &'static str {
        match self {
            PropertyType::PayloadFormatIndicator => "payload format indicator",
            PropertyType::MessageExpiryInterval => "message expiry interval",
            PropertyType::ContentType => "content type",
            PropertyType::ResponseTopic => "response topic",
            PropertyType::CorrelationData => "correlation data",
            PropertyType::SubscriptionIdentifier => "subscription identifier",
            PropertyType::SessionExpiryInterval => "session expiry interval",
            PropertyType::AssignedClientIdentifier => "assigned client identifier",
            PropertyType::ServerKeepAlive => "server keep alive",
            PropertyType::AuthenticationMethod => "authentication method",
            PropertyType::AuthenticationData => "authentication data",
            PropertyType::RequestProblemInformation => "request problem information",
            PropertyType::WillDelayInterval => "will delay interval",
            PropertyType::RequestResponseInformation => "request response information",
            PropertyType::ResponseInformation => "response information",
            PropertyType::ServerReference => "server reference",
            PropertyType::ReasonString => "reason string",
            PropertyType::ReceiveMaximum => "receive maximum",
            PropertyType::TopicAliasMaximum => "topic alias maximum",
            PropertyType::TopicAlias => "topic alias",
            PropertyType::MaximumQos => "maximum qos",
            PropertyType::RetainAvailable => "retain available",
            PropertyType::UserProperty => "user property",
            PropertyType::MaximumPacketSize => "maximum packet size",
            PropertyType::WildcardSubscriptionAvailable => "wildcard subscription available",
            PropertyType::SubscriptionIdentifierAvailable => "subscription identifier available",
            PropertyType::SharedSubscriptionAvailable => "shared subscription available",
        }
    }

    pub fn layout(&self) -> PropertyLayout {
        match self {
            PropertyType::PayloadFormatIndicator
            | PropertyType::RequestProblemInformation
            | PropertyType::RequestResponseInformation
            | PropertyType::MaximumQos
            | PropertyType::RetainAvailable
            | PropertyType::WildcardSubscriptionAvailable
            | PropertyType::SubscriptionIdentifierAvailable
            | PropertyType::SharedSubscriptionAvailable => PropertyLayout::Byte,
            PropertyType::ServerKeepAlive
            | PropertyType::ReceiveMaximum
            | PropertyType::TopicAliasMaximum
            | PropertyType::TopicAlias => PropertyLayout::TwoByteInt,
            PropertyType::MessageExpiryInterval
            | PropertyType::SessionExpiryInterval
            | PropertyType::WillDelayInterval
            | PropertyType::MaximumPacketSize => PropertyLayout::FourByteInt,
            PropertyType::SubscriptionIdentifier => PropertyLayout::VariableByteInt,
            PropertyType::ContentType
            | PropertyType::ResponseTopic
            | PropertyType::AssignedClientIdentifier
            | PropertyType::AuthenticationMethod
            | PropertyType::ResponseInformation
            | PropertyType::ServerReference
            | PropertyType::ReasonString => PropertyLayout::String,
            PropertyType::CorrelationData | PropertyType::AuthenticationData => {
                PropertyLayout::BinaryData
            },
            PropertyType::UserProperty => PropertyLayout::StringPair,
        }
    }
}
