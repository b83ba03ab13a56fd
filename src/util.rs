pub(crate) mod read {
    /// Decodes a base64 stanza argument into a fixed-size buffer.
    pub(crate) fn base64_arg<A: AsMut<[u8]>>(arg: &str, mut buf: A) -> Option<A> {
        if arg.len() != ((4 * buf.as_mut().len()) + 2) / 3 {
            return None;
        }

        match base64::decode_config_slice(arg, base64::STANDARD_NO_PAD, buf.as_mut()) {
            Ok(n) if n == buf.as_mut().len() => Some(buf),
            _ => None,
        }
    }
}

pub(crate) mod write {
    /// Unpadded standard base64, as used for stanza arguments.
    pub(crate) fn encoded(data: &[u8]) -> String {
        base64::encode_config(data, base64::STANDARD_NO_PAD)
    }
}
