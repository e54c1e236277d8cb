use crate::types::LANDMARKS_PER_HAND;

/// An edge of the hand skeleton between two landmark indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub start: usize,
    pub end: usize,
}

const fn edge(start: usize, end: usize) -> Connection {
    Connection { start, end }
}

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const MIDDLE_MCP: usize = 9;
pub const RING_MCP: usize = 13;
pub const PINKY_MCP: usize = 17;
pub const PINKY_TIP: usize = 20;

/// The 21-point hand skeleton: five finger chains rooted at the wrist.
pub const HAND_CONNECTIONS: [Connection; 20] = [
    edge(WRIST, 1),
    edge(1, 2),
    edge(2, 3),
    edge(3, THUMB_TIP),
    edge(WRIST, INDEX_MCP),
    edge(INDEX_MCP, 6),
    edge(6, 7),
    edge(7, 8),
    edge(WRIST, MIDDLE_MCP),
    edge(MIDDLE_MCP, 10),
    edge(10, 11),
    edge(11, 12),
    edge(WRIST, RING_MCP),
    edge(RING_MCP, 14),
    edge(14, 15),
    edge(15, 16),
    edge(WRIST, PINKY_MCP),
    edge(PINKY_MCP, 18),
    edge(18, 19),
    edge(19, PINKY_TIP),
];

pub fn hand_connections() -> &'static [Connection] {
    &HAND_CONNECTIONS
}

// Evaluated at compile time: a bad index fails the build.
const _: () = {
    let mut i = 0;
    while i < HAND_CONNECTIONS.len() {
        assert!(HAND_CONNECTIONS[i].start < LANDMARKS_PER_HAND);
        assert!(HAND_CONNECTIONS[i].end < LANDMARKS_PER_HAND);
        i += 1;
    }
};
