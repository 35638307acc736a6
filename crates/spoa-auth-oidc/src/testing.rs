//! A stand-in identity provider signing key for tests.
//!
//! Tokens signed here verify against [`jwks_document`], which a mock
//! provider serves at its `jwks_uri`.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

/// `kid` of the test key.
pub const KEY_ID: &str = "spoa-auth-test";

const PRIVATE_KEY_PEM: &str = include_str!("../testdata/idp-rsa.pem");

const MODULUS: &str = "6ggmfZgXVANmRiuenmaXffCi_ilV-v6IyJMDLK8SAmWNk0ermi-zz9hcizHX2AJ08c8ObS_wyTujCmrLFmCziI6W4xIJ_Iy9QOvO3HIjvXC5EE9EVxhAlYsr2_Sa-LGS6OxjNfx8-NaIw0BevO-SD0_qmz5sG66uotlp2QfgI11RiHYyGbHWQjcSS9c_UieZkPx0sZ0MSVHAAn0TaGMwp_1OJW7B6SPZjJRHSTFtplJaMrXOF7irheLMF2Qk4_zHg0VDwp6GHA3XCN3DHTYTOm9-A_RFqd10xgZCWvl2eeqo2og60HEAcTTx3FvC4GKhHYK4VM2qYJCBDMiZxJCC-Q";

/// JWKS document publishing the test key.
pub fn jwks_document() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": KEY_ID,
            "use": "sig",
            "alg": "RS256",
            "n": MODULUS,
            "e": "AQAB"
        }]
    })
}

pub fn jwks() -> JwkSet {
    serde_json::from_value(jwks_document()).expect("test JWKS parses")
}

/// Sign `claims` as an RS256 ID token under the test key.
pub fn sign_id_token(claims: &Value) -> String {
    sign_with_kid(claims, KEY_ID)
}

/// Sign with the test key but advertise another `kid`.
pub fn sign_with_kid(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM.as_bytes()).expect("test key parses");
    jsonwebtoken::encode(&header, claims, &key).expect("test token signs")
}
