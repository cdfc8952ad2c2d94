#[cfg(not(windows))]
mod fuzz {
    use honggfuzz::fuzz;
    use sdat2img::format::rangeset::RangeSet;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                let Ok(token) = std::str::from_utf8(data) else {
                    return;
                };

                if let Ok(ranges) = token.parse::<RangeSet>() {
                    assert_eq!(ranges.to_string().parse::<RangeSet>().ok(), Some(ranges));
                }
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
