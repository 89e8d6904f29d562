pub mod collections;
pub mod concepts {
    pub mod interface;
    pub mod link;
    pub mod neighbour;
    pub mod packet;
    pub mod prefix;
    pub mod route;
}
pub mod cursor;
pub mod duplicate;
pub mod feedback;
pub mod framework;
pub mod lsdb;
pub mod metric;
pub mod mpr;
mod parser;
mod process;
pub mod rib;
pub mod router;
pub mod spf;
pub mod timer;
pub mod util;
