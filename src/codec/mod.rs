pub mod action_path;

pub use action_path::{
    encode_group_prefix, encode_leaf, encode_member_identifier, encode_member_path,
};
