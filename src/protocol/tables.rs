//! Fixed lookup tables shared by every connection.
//!
//! Compile-time constants only: nothing here is ever mutated, so sessions
//! read them without synchronization.

/// Method names indexed by `code - 1`.
const METHODS: [&str; 27] = [
    "OPTIONS",
    "GET",
    "HEAD",
    "POST",
    "PUT",
    "DELETE",
    "TRACE",
    "PROPFIND",
    "PROPPATCH",
    "MKCOL",
    "COPY",
    "MOVE",
    "LOCK",
    "UNLOCK",
    "ACL",
    "REPORT",
    "VERSION-CONTROL",
    "CHECKIN",
    "CHECKOUT",
    "UNCHECKOUT",
    "SEARCH",
    "MKWORKSPACE",
    "UPDATE",
    "LABEL",
    "MERGE",
    "BASELINE_CONTROL",
    "MKACTIVITY",
];

/// Method name used for codes outside the table.
pub const UNKNOWN_METHOD: &str = "UNKNOWN";

/// Decode a method code byte.
pub fn method_name(code: u8) -> &'static str {
    match code {
        1..=27 => METHODS[usize::from(code) - 1],
        _ => UNKNOWN_METHOD,
    }
}

/// Encode a method name (exact match). `None` for names outside the table.
pub fn method_code(name: &str) -> Option<u8> {
    METHODS
        .iter()
        .position(|m| *m == name)
        .and_then(|i| u8::try_from(i + 1).ok())
}

/// Coded header names sent by the front end.
const REQUEST_HEADER_CODES: [(u16, &str); 14] = [
    (0xA001, "Accept"),
    (0xA002, "Accept-Charset"),
    (0xA003, "Accept-Encoding"),
    (0xA004, "Accept-Language"),
    (0xA005, "Authorization"),
    (0xA006, "Connection"),
    (0xA007, "Content-Type"),
    (0xA008, "Content-Length"),
    (0xA009, "Cookie"),
    (0xA00A, "Cookie2"),
    (0xA00B, "Host"),
    (0xA00C, "Pragma"),
    (0xA00D, "Referer"),
    (0xA00E, "User-Agent"),
];

/// Decode a coded request header name.
pub fn request_header_name(code: u16) -> Option<&'static str> {
    REQUEST_HEADER_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Code for a request header name, case-insensitive.
pub fn request_header_code(name: &str) -> Option<u16> {
    REQUEST_HEADER_CODES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(code, _)| *code)
}

/// Coded header names sent back to the front end. `server` and
/// `servlet-engine` share 0xA009.
const RESPONSE_HEADER_CODES: [(&str, u16); 12] = [
    ("content-type", 0xA001),
    ("content-language", 0xA002),
    ("content-length", 0xA003),
    ("date", 0xA004),
    ("last-modified", 0xA005),
    ("location", 0xA006),
    ("set-cookie", 0xA007),
    ("set-cookie2", 0xA008),
    ("servlet-engine", 0xA009),
    ("server", 0xA009),
    ("status", 0xA00A),
    ("www-authenticate", 0xA00B),
];

/// Code for a response header name, case-insensitive.
pub fn response_header_code(name: &str) -> Option<u16> {
    RESPONSE_HEADER_CODES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

/// Canonical header name for a response code.
pub fn response_header_name(code: u16) -> Option<&'static str> {
    let name = match code {
        0xA001 => "Content-Type",
        0xA002 => "Content-Language",
        0xA003 => "Content-Length",
        0xA004 => "Date",
        0xA005 => "Last-Modified",
        0xA006 => "Location",
        0xA007 => "Set-Cookie",
        0xA008 => "Set-Cookie2",
        0xA009 => "Server",
        0xA00A => "Status",
        0xA00B => "WWW-Authenticate",
        _ => return None,
    };
    Some(name)
}

/// Request attribute carried after the header list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Attribute {
    Context = 0x01,
    ServletPath = 0x02,
    RemoteUser = 0x03,
    AuthType = 0x04,
    QueryString = 0x05,
    JvmRoute = 0x06,
    SslCert = 0x07,
    SslCipher = 0x08,
    SslSession = 0x09,
    ReqAttribute = 0x0A,
}

impl Attribute {
    pub fn from_code(code: u8) -> Option<Self> {
        let attr = match code {
            0x01 => Self::Context,
            0x02 => Self::ServletPath,
            0x03 => Self::RemoteUser,
            0x04 => Self::AuthType,
            0x05 => Self::QueryString,
            0x06 => Self::JvmRoute,
            0x07 => Self::SslCert,
            0x08 => Self::SslCipher,
            0x09 => Self::SslSession,
            0x0A => Self::ReqAttribute,
            _ => return None,
        };
        Some(attr)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::ServletPath => "servlet_path",
            Self::RemoteUser => "remote_user",
            Self::AuthType => "auth_type",
            Self::QueryString => "query_string",
            Self::JvmRoute => "jvm_route",
            Self::SslCert => "ssl_cert",
            Self::SslCipher => "ssl_cipher",
            Self::SslSession => "ssl_session",
            Self::ReqAttribute => "req_attribute",
        }
    }
}

/// Ordered cipher-suite fragments and their key sizes in bits.
const CIPHER_KEY_SIZES: [(&str, u16); 8] = [
    ("_WITH_NULL_", 0),
    ("_WITH_IDEA_CBC_", 128),
    ("_WITH_RC2_CBC_40_", 40),
    ("_WITH_RC4_40_", 40),
    ("_WITH_RC4_128_", 128),
    ("_WITH_DES40_CBC_", 40),
    ("_WITH_DES_CBC_", 56),
    ("_WITH_3DES_EDE_CBC_", 168),
];

/// Key size for a cipher suite name; first matching rule wins.
pub fn cipher_key_size(cipher_suite: &str) -> Option<u16> {
    CIPHER_KEY_SIZES
        .iter()
        .find(|(fragment, _)| cipher_suite.contains(fragment))
        .map(|(_, bits)| *bits)
}
