pub mod fixtures;

#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod segment_tests;
#[cfg(test)]
mod status_tests;
#[cfg(test)]
mod ws_tests;
