pub mod board;
pub mod kicad_mod;
pub mod kicad_net;
pub mod sexp;

// Re-export for convenience
pub use board::{merge_drills, parse_board_json, parse_excellon};
pub use kicad_mod::{FootprintParseError, KicadModParser};
pub use kicad_net::{KicadNetlistParser, NetlistParseError};
pub use sexp::{ParseError, SExp, SExpParser};
