use crate::peer::types::{IceServerConfig, IceServerKind};
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Добавляет схему протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &IceServerConfig) -> String {
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
    {
        config.url.clone()
    } else {
        let scheme = match config.r#type {
            IceServerKind::Turn => "turn:",
            IceServerKind::Stun => "stun:",
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(kind: IceServerKind, url: &str) -> IceServerConfig {
        IceServerConfig {
            id: "test".into(),
            r#type: kind,
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    #[test]
    fn scheme_is_added_by_kind() {
        assert_eq!(
            add_ice_url_scheme(&server(IceServerKind::Stun, "stun.example.org:3478")),
            "stun:stun.example.org:3478"
        );
        assert_eq!(
            add_ice_url_scheme(&server(IceServerKind::Turn, "turn.example.org:3478")),
            "turn:turn.example.org:3478"
        );
    }

    #[test]
    fn existing_scheme_is_kept() {
        assert_eq!(
            add_ice_url_scheme(&server(IceServerKind::Turn, "stun:stun.l.google.com:19302")),
            "stun:stun.l.google.com:19302"
        );
    }

    #[test]
    fn random_ids_are_hex_and_distinct() {
        let a = random_id();
        let b = random_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
