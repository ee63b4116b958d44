use http::Version;

/// What a connection negotiated: the HTTP version spoken on it and, for TLS transports,
/// the handshake details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    version: Version,
    tls: Option<TlsInfo>,
}

/// Details of a completed TLS handshake, supplied by whoever dialed the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    pub server_name: String,
    pub alpn_protocol: Option<String>,
}

impl Protocol {
    #[must_use]
    pub fn http11() -> Self {
        Self { version: Version::HTTP_11, tls: None }
    }

    #[must_use]
    pub fn new(version: Version, tls: Option<TlsInfo>) -> Self {
        Self { version, tls }
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn major(&self) -> u8 {
        match self.version {
            Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11 => 1,
            Version::HTTP_2 => 2,
            Version::HTTP_3 => 3,
            _ => 0,
        }
    }

    #[must_use]
    pub fn minor(&self) -> u8 {
        match self.version {
            Version::HTTP_09 => 9,
            Version::HTTP_11 => 1,
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    #[must_use]
    pub fn tls(&self) -> Option<&TlsInfo> {
        self.tls.as_ref()
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::http11()
    }
}
