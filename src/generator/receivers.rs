//! Merchant and charity names used as transaction receivers.

#[rustfmt::skip]
pub const RECEIVERS: &[&str] = &[
    // General retail
    "Walmart", "Target", "Costco Wholesale", "Kroger", "Publix", "Safeway", "Albertsons",
    "Whole Foods Market", "Trader Joe's", "Aldi", "Lidl", "Wegmans", "H-E-B", "Food Lion",
    // Home and hardware
    "The Home Depot", "Lowe's", "Ace Hardware", "Menards", "Harbor Freight Tools", "IKEA",
    "Crate & Barrel", "Williams-Sonoma", "Pottery Barn", "Floor & Decor",
    // Electronics and office
    "Best Buy", "Micro Center", "Apple Store", "GameStop", "Staples", "Office Depot", "Newegg.com",
    // Apparel
    "Macy's", "Nordstrom", "Kohl's", "JCPenney", "Saks Fifth Avenue", "Bloomingdale's", "Gap",
    "Old Navy", "J.Crew", "H&M", "Zara", "Uniqlo", "Lululemon", "Nike", "Adidas",
    "Dick's Sporting Goods", "REI", "Foot Locker",
    // Pharmacies and discount
    "CVS Pharmacy", "Walgreens", "Rite Aid", "Dollar General", "Dollar Tree", "Five Below",
    // Online
    "Amazon.com", "eBay", "Etsy", "Wayfair", "Zappos", "Chewy",
    // Restaurants
    "McDonald's", "Burger King", "Wendy's", "Taco Bell", "Chick-fil-A", "Subway", "KFC",
    "Five Guys", "Shake Shack", "Domino's", "Chipotle Mexican Grill", "Panda Express",
    "Starbucks", "Dunkin'", "Panera Bread", "Olive Garden", "Outback Steakhouse",
    "The Cheesecake Factory", "Denny's", "IHOP", "Waffle House",
    // Tech and services
    "Google", "Microsoft", "Netflix", "Spotify", "Hulu", "Disney+", "Adobe", "Uber", "Lyft",
    "DoorDash", "Instacart", "Airbnb", "PayPal", "Shopify", "Dropbox",
    // Travel and auto
    "Delta Air Lines", "American Airlines", "United Airlines", "Southwest Airlines", "JetBlue",
    "Marriott International", "Hilton", "Hyatt Hotels", "Expedia", "Booking.com",
    "Enterprise Rent-A-Car", "Hertz", "AutoZone", "O'Reilly Auto Parts",
    // Charities
    "American Red Cross", "Doctors Without Borders", "UNICEF", "Habitat for Humanity",
    "St. Jude Children's Research Hospital", "The Humane Society", "Feeding America",
    "Goodwill Industries", "The Salvation Army", "United Way", "Make-A-Wish Foundation",
    "American Cancer Society", "Save the Children", "Wounded Warrior Project", "ASPCA",
    // Utilities and telecom
    "AT&T", "Verizon", "T-Mobile", "Comcast (Xfinity)", "Duke Energy", "Con Edison",
    // Finance and insurance
    "Bank of America", "JPMorgan Chase", "Wells Fargo", "Capital One", "American Express",
    "Geico", "Progressive", "State Farm", "Allstate",
    // Fuel and convenience
    "7-Eleven", "Circle K", "Shell", "ExxonMobil", "Chevron", "Sheetz", "Wawa",
];
