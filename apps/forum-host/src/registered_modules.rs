// Links every page module crate so its inventory registration is kept.
// New module crates must be added here by hand.
#![allow(unused_imports)]

use page_bbcode as _;
