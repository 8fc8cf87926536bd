fn main() -> anyhow::Result<()> {
    fallwatch::run()
}
