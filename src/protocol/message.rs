//! The capability shared by every protocol message.

use std::path::Path;

use crate::error::Result;

/// A protocol message with a wire form.
pub trait Message {
    /// Serialize to the exact bytes written to the socket.
    fn to_bytes(&self) -> Vec<u8>;

    /// Write the wire form to `path`, replacing any existing file.
    fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;

    #[test]
    fn test_save_writes_wire_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.req");

        let request = Request::new().with_header("Blackfire-Query", "q");
        request.save(&path).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), request.to_bytes());
    }

    #[test]
    fn test_message_is_object_safe() {
        let messages: Vec<Box<dyn Message>> = vec![
            Box::new(Request::new().with_header("a", "b")),
            Box::new(Request::new()),
        ];
        assert_eq!(messages[0].to_bytes(), b"a: b\n\n");
        assert!(messages[1].to_bytes().is_empty());
    }
}
