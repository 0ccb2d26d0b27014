use hmac::{Hmac, Mac, NewMac};
use sha2::Sha256;

use gateway_utils::time::get_current_milliseconds;

type HmacSha256 = Hmac<Sha256>;

/// Stateless request signer given venue credentials (C1). Appends
/// `timestamp` and, if configured, `recvWindow`, computes the HMAC-SHA256
/// signature over the insertion-ordered, URL-encoded parameter string and
/// appends it as the final parameter.
///
/// The API key itself is never part of the signed payload: callers carry it
/// in the `X-MBX-APIKEY` header.
pub struct Signer {
    secret_key: String,
    recv_window_ms: Option<u64>,
}

impl Signer {
    pub fn new(secret_key: impl Into<String>, recv_window_ms: Option<u64>) -> Self {
        Self {
            secret_key: secret_key.into(),
            recv_window_ms,
        }
    }

    /// Appends `timestamp`/`recvWindow`/`signature` to `params` (an
    /// insertion-ordered list of key/value pairs) and returns the final,
    /// signed parameter list.
    pub fn sign(&self, mut params: Vec<(String, String)>) -> Vec<(String, String)> {
        params.push(("timestamp".to_owned(), get_current_milliseconds().to_string()));
        if let Some(recv_window) = self.recv_window_ms {
            params.push(("recvWindow".to_owned(), recv_window.to_string()));
        }

        let query = encode_params(&params);
        let signature = self.hmac_hex(&query);
        params.push(("signature".to_owned(), signature));
        params
    }

    fn hmac_hex(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take a key of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// URL-encodes `key=value` pairs in insertion order and joins them with `&`,
/// matching the exact bytes that get sent on the wire -- the signature must
/// be computed over this same representation.
pub fn encode_params(params: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_fixed_inputs() {
        let signer = Signer::new("secret", None);
        let params = vec![
            ("symbol".to_owned(), "LTCBTC".to_owned()),
            ("side".to_owned(), "BUY".to_owned()),
        ];

        let signed_a = signer.sign(params.clone());
        let signed_b = signer.sign(params);

        // timestamps differ call to call, but the signature is a pure
        // function of the exact bytes fed to HMAC-SHA256 -- verify that
        // property by signing a message with an explicit fixed timestamp.
        let fixed = vec![
            ("symbol".to_owned(), "LTCBTC".to_owned()),
            ("side".to_owned(), "BUY".to_owned()),
            ("timestamp".to_owned(), "1499827319559".to_owned()),
        ];
        let query = encode_params(&fixed);
        let sig1 = signer.hmac_hex(&query);
        let sig2 = signer.hmac_hex(&query);
        assert_eq!(sig1, sig2);

        // sanity: both real signings produced a lowercase hex digest and
        // appended timestamp/signature as the tail parameters.
        assert_eq!(signed_a.last().unwrap().0, "signature");
        assert_eq!(signed_b.last().unwrap().0, "signature");
        assert!(signed_a
            .last()
            .unwrap()
            .1
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn recv_window_is_appended_before_signature_when_configured() {
        let signer = Signer::new("secret", Some(5000));
        let signed = signer.sign(vec![("symbol".to_owned(), "BTCUSDT".to_owned())]);

        let keys: Vec<&str> = signed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["symbol", "timestamp", "recvWindow", "signature"]);
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let query = "symbol=LTCBTC&side=BUY&quantity=1";
        let sig_a = Signer::new("secret-a", None).hmac_hex(query);
        let sig_b = Signer::new("secret-b", None).hmac_hex(query);
        assert_ne!(sig_a, sig_b);
        assert_eq!(sig_a.len(), 64);
    }
}
