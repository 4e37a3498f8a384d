pub mod review;
pub mod vcs;
pub mod workspace;
