use hls::driver;
use hls_utils::HlsResult;

fn main() -> HlsResult<()> {
    driver::run_hls()
}
