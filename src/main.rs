fn main() -> anyhow::Result<()> {
    hk3_bot_lib::run()
}
