use clap::Parser;
use swtcp::config::ServerArgs;
use swtcp::ip::TunIp;
use swtcp::Connection;

fn main() {
    env_logger::init();
    let args = ServerArgs::parse();

    let tun = TunIp::new(&args.tun.device, args.tun.addr, args.tun.netmask).unwrap_or_else(|e| {
        eprintln!("failed to bring up {}: {e}", args.tun.device);
        std::process::exit(1);
    });

    let mut conn = Connection::new(tun);
    conn.open().unwrap();

    println!(">>> Waiting for incoming connections on port {}...", args.port);
    let peer = conn.listen(args.port).unwrap_or_else(|e| {
        eprintln!("listen failed: {e}");
        std::process::exit(1);
    });
    println!(">>> Connection accepted from {peer}");

    loop {
        let mut buf = [0u8; 1500];
        let n = conn.read(&mut buf, buf.len()).unwrap();
        if n == 0 {
            break;
        }

        conn.write(&buf[..n]).unwrap();
        println!(
            "\n>>> Read: {:?}\n",
            String::from_utf8_lossy(&buf[..n])
        );
    }

    conn.close().unwrap();
}
