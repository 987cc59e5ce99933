#[must_use]
pub(crate) enum HumanFmt {
    Size(u64),
    Time(std::time::Duration),
}

impl std::fmt::Display for HumanFmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[inline]
        #[must_use]
        const fn precision(size: f64) -> usize {
            if size > 100.0 {
                0
            } else if size > 10.0 {
                1
            } else {
                2
            }
        }

        #[expect(clippy::cast_precision_loss)]
        match *self {
            Self::Size(bytes) => {
                if bytes < 1000 {
                    return f.write_fmt(format_args!("{bytes}B"));
                }
                let size = bytes as f64 / 1000.0;
                if size < 1000.0 {
                    return f.write_fmt(format_args!("{size:.0$}kB", precision(size)));
                }
                let size = size / 1000.0;
                if size < 1000.0 {
                    return f.write_fmt(format_args!("{size:.0$}MB", precision(size)));
                }
                let size = size / 1000.0;
                f.write_fmt(format_args!("{size:.0$}GB", precision(size)))
            }
            Self::Time(time) => {
                let time = time.as_nanos();
                if time < 1000 {
                    return f.write_fmt(format_args!("{time}ns"));
                }
                let time = time as f64 / 1000.0;
                if time < 1000.0 {
                    return f.write_fmt(format_args!("{time:.0$}us", precision(time)));
                }
                let time = time / 1000.0;
                if time < 1000.0 {
                    return f.write_fmt(format_args!("{time:.0$}ms", precision(time)));
                }
                let time = time / 1000.0;
                if time < 600.0 {
                    return f.write_fmt(format_args!("{time:.0$}s", precision(time)));
                }
                #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let time = time as u64;
                let secs = time % 60;
                let mins = (time / 60) % 60;
                let hours = time / 3600;

                let hours_fmt = if hours != 0 {
                    format_args!("{hours}h")
                } else {
                    format_args!("")
                };

                let mins_fmt = if mins != 0 {
                    format_args!("{mins}m")
                } else {
                    format_args!("")
                };

                let secs_fmt = if secs != 0 {
                    format_args!("{secs}s")
                } else {
                    format_args!("")
                };

                f.write_fmt(format_args!("{hours_fmt}{mins_fmt}{secs_fmt}"))
            }
        }
    }
}
