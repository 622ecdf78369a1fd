use std::io::Write;

use crate::{
    error::{Error, Result},
    hash::FileId,
    peer::PeerId,
};

use super::{Message, MessageType, MAX_CHUNK_SIZE, MAX_REPLICATION_DEGREE};

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.body.len() + 128);

        // writes into a Vec cannot fail
        let _ = write!(bytes, "{} {} {}", self.kind, self.version, self.sender);
        if let Some(file_id) = self.file_id {
            let _ = write!(bytes, " {file_id}");
        }
        if let Some(chunk_no) = self.chunk_no {
            let _ = write!(bytes, " {chunk_no}");
        }
        if let Some(replication_degree) = self.replication_degree {
            let _ = write!(bytes, " {replication_degree}");
        }

        bytes.extend_from_slice(CRLF);
        bytes.extend_from_slice(CRLF);
        bytes.extend_from_slice(&self.body);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, body) = split_header(bytes)?;
        let mut fields = header.split_ascii_whitespace();

        let kind: MessageType = next_field(&mut fields, "type")?.parse()?;
        let version = next_field(&mut fields, "version")?.to_owned();
        let sender: PeerId = next_field(&mut fields, "senderId")?.parse()?;

        let file_id = if kind.has_file_id() {
            Some(next_field(&mut fields, "fileId")?.parse::<FileId>()?)
        } else {
            None
        };

        let chunk_no = if kind.has_chunk_no() {
            Some(next_field(&mut fields, "chunkNo")?.parse::<u32>()?)
        } else {
            None
        };

        let replication_degree = if kind.has_replication_degree() {
            let degree: u8 = next_field(&mut fields, "replicationDegree")?.parse()?;
            if !(1..=MAX_REPLICATION_DEGREE).contains(&degree) {
                return Err(Error::InvalidReplicationDegree(degree));
            }
            Some(degree)
        } else {
            None
        };

        if let Some(extra) = fields.next() {
            return Err(Error::MalformedMessage(format!(
                "unexpected field `{extra}` in {kind} header"
            )));
        }

        let body = if kind.has_body() {
            if body.len() > MAX_CHUNK_SIZE {
                return Err(Error::ChunkTooLarge(body.len(), MAX_CHUNK_SIZE));
            }
            body.to_vec()
        } else {
            vec![]
        };

        Ok(Message {
            kind,
            version,
            sender,
            file_id,
            chunk_no,
            replication_degree,
            body,
        })
    }
}

pub fn peek_sender(bytes: &[u8]) -> Option<PeerId> {
    let (header, _) = split_header(bytes).ok()?;
    header.split_ascii_whitespace().nth(2)?.parse().ok()
}

fn split_header(bytes: &[u8]) -> Result<(&str, &[u8])> {
    let end = bytes
        .windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
        .ok_or_else(|| Error::MalformedMessage("missing header terminator".to_owned()))?;
    let header = std::str::from_utf8(&bytes[..end])
        .map_err(|err| Error::MalformedMessage(err.to_string()))?;
    let body = &bytes[end + HEADER_END.len()..];
    Ok((header, body))
}

fn next_field<'a, I: Iterator<Item = &'a str>>(fields: &mut I, name: &str) -> Result<&'a str> {
    fields
        .next()
        .ok_or_else(|| Error::MalformedMessage(format!("header is missing `{name}`")))
}
